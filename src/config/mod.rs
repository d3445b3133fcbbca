use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1319;

/// How received data is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Keep the compressed container as received
    Msz,
    /// Decompress back to mzML on arrival
    Mzml,
}

impl StoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreMode::Msz => "msz",
            StoreMode::Mzml => "mzml",
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "msz" => Ok(StoreMode::Msz),
            "mzml" => Ok(StoreMode::Mzml),
            other => Err(format!("invalid store mode '{}', expected msz or mzml", other)),
        }
    }
}

/// Receiver configuration. Immutable once a server is built.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory for received files (default: "./received")
    pub output_dir: PathBuf,

    /// Storage representation (default: msz)
    pub store_as: StoreMode,

    /// Bind address (default: "0.0.0.0")
    pub host: String,

    /// Listen port (default: 1319)
    pub port: u16,

    /// Maximum wait for the next body chunk before the upload fails (default: 300 s)
    pub read_timeout: Duration,

    /// Age after which terminal records are evicted. `None` keeps them forever.
    pub retention: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./received"),
            store_as: StoreMode::Msz,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            read_timeout: Duration::from_secs(300),
            retention: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            output_dir: env::var("MSTRANSFER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.output_dir),

            store_as: env::var("MSTRANSFER_STORE_AS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.store_as),

            host: env::var("MSTRANSFER_HOST").unwrap_or(default.host),

            port: env::var("MSTRANSFER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            read_timeout: env::var("MSTRANSFER_READ_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.read_timeout),

            retention: env::var("MSTRANSFER_RETENTION_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .or(default.retention),
        }
    }

    pub fn new(output_dir: impl Into<PathBuf>, store_as: StoreMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            store_as,
            ..Self::default()
        }
    }
}

/// Sender configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Concurrent uploads in a batch (default: 4)
    pub parallelism: usize,

    /// Read/compress chunk size in bytes (default: 1 MiB)
    pub chunk_size: usize,

    /// Whole-request timeout, also used as the status polling window (default: 1 h)
    pub timeout: Duration,

    /// Connect timeout (default: 10 s)
    pub connect_timeout: Duration,

    /// Delay between status polls (default: 500 ms)
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            chunk_size: 1024 * 1024, // 1 MiB
            timeout: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            parallelism: env::var("MSTRANSFER_PARALLEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.parallelism),

            chunk_size: env::var("MSTRANSFER_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(default.chunk_size),

            timeout: env::var("MSTRANSFER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.timeout),

            ..default
        }
    }
}
