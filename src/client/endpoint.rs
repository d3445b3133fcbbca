use crate::config::DEFAULT_PORT;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Invalid target '{target}': {reason}")]
    Invalid { target: String, reason: String },
}

/// Base URL of a receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    /// Accepts `host`, `host:port` or a full `http(s)://` URL.
    /// A bare host gets the default port.
    pub fn parse(target: &str) -> Result<Self, EndpointError> {
        let invalid = |reason: String| EndpointError::Invalid {
            target: target.to_string(),
            reason,
        };

        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty target".to_string()));
        }

        let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else if trimmed.contains(':') {
            format!("http://{}", trimmed)
        } else {
            format!("http://{}:{}", trimmed, DEFAULT_PORT)
        };

        let mut base = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
        if base.host_str().is_none_or(|h| h.is_empty()) {
            return Err(invalid("missing host".to_string()));
        }
        base.set_query(None);
        base.set_fragment(None);

        // Paths join relative to a directory, so keep exactly one trailing slash
        let path = format!("{}/", base.path().trim_end_matches('/'));
        base.set_path(&path);

        Ok(Self { base })
    }

    pub fn health_url(&self) -> Url {
        self.join("v1/health")
    }

    pub fn upload_url(&self) -> Url {
        self.join("v1/upload")
    }

    pub fn status_url(&self, transfer_id: &str) -> Url {
        let mut url = self.join("v1/transfer/");
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(transfer_id).push("status");
        }
        url
    }

    fn join(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let joined = format!("{}{}", self.base.path(), path);
        url.set_path(&joined);
        url
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str().trim_end_matches('/'))
    }
}
