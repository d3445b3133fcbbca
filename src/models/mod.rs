use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// Supported container kinds. `mzML` is the only uncompressed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Format {
    #[serde(rename = "mzML")]
    MzMl,
    #[serde(rename = "msz")]
    Msz,
    #[serde(rename = "mszx")]
    Mszx,
}

impl Format {
    /// Classify by extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mzml" => Some(Format::MzMl),
            "msz" => Some(Format::Msz),
            "mszx" => Some(Format::Mszx),
            _ => None,
        }
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, Format::MzMl)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Format::MzMl => "mzML",
            Format::Msz => "msz",
            Format::Mszx => "mszx",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim_start_matches('.'))
            .ok_or_else(|| TransferError::UnsupportedFormat(s.to_string()))
    }
}

/// Lifecycle of a single transfer on the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Receiving,
    Decompressing,
    Stored,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Stored | TransferState::Failed)
    }

    /// Allowed edges: receiving -> {decompressing, stored, failed},
    /// decompressing -> {stored, failed}. Terminal states have no exits.
    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Receiving, Decompressing)
                | (Receiving, Stored)
                | (Receiving, Failed)
                | (Decompressing, Stored)
                | (Decompressing, Failed)
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferState::Receiving => "receiving",
            TransferState::Decompressing => "decompressing",
            TransferState::Stored => "stored",
            TransferState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ErrorKind {
    UnsupportedFormat,
    CompressionFailure,
    TransportFailure,
    StorageFailure,
    DecompressionFailure,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Compression failed: {0}")]
    CompressionFailure(String),

    #[error("Transport failed: {0}")]
    TransportFailure(String),

    #[error("Storage failed: {0}")]
    StorageFailure(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailure(String),
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            TransferError::CompressionFailure(_) => ErrorKind::CompressionFailure,
            TransferError::TransportFailure(_) => ErrorKind::TransportFailure,
            TransferError::StorageFailure(_) => ErrorKind::StorageFailure,
            TransferError::DecompressionFailure(_) => ErrorKind::DecompressionFailure,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            TransferError::UnsupportedFormat(d)
            | TransferError::CompressionFailure(d)
            | TransferError::TransportFailure(d)
            | TransferError::StorageFailure(d)
            | TransferError::DecompressionFailure(d) => d,
        }
    }

    pub fn from_kind(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match kind {
            ErrorKind::UnsupportedFormat => TransferError::UnsupportedFormat(detail),
            ErrorKind::CompressionFailure => TransferError::CompressionFailure(detail),
            ErrorKind::TransportFailure => TransferError::TransportFailure(detail),
            ErrorKind::StorageFailure => TransferError::StorageFailure(detail),
            ErrorKind::DecompressionFailure => TransferError::DecompressionFailure(detail),
        }
    }
}

/// Serialized form of a [`TransferError`] inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&TransferError> for ErrorDetail {
    fn from(err: &TransferError) -> Self {
        Self {
            kind: err.kind(),
            detail: err.detail().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: String,
    pub filename: String,
    pub state: TransferState,
    pub bytes_received: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransferRecord {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            state: TransferState::Receiving,
            bytes_received: 0,
            stored_as: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: String,
    pub filename: String,
    pub state: TransferState,
    pub bytes_received: u64,
    #[serde(default)]
    pub stored_as: Option<String>,
}

impl From<TransferRecord> for UploadResponse {
    fn from(record: TransferRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            state: record.state,
            bytes_received: record.bytes_received,
            stored_as: record.stored_as,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store_as: String,
}
