use std::path::Path;

/// Longest accepted transfer identifier
pub const MAX_TRANSFER_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Reduces a client-supplied file name to a safe single path component.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    // Keep only the last component, whichever separator the client used
    let last = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let name = Path::new(last)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        });
    }

    if name != filename {
        tracing::warn!("Path components stripped from filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    // Hidden names would collide with nothing but are easy to miss on disk
    if sanitized.starts_with('.') {
        return Err(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        });
    }

    Ok(sanitized)
}

/// Transfer identifiers end up in temp file names, so only
/// `[A-Za-z0-9_-]` is accepted.
pub fn validate_transfer_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_TRANSFER_ID_LEN {
        return Err(ValidationError {
            code: "INVALID_TRANSFER_ID",
            message: format!(
                "Transfer ID must be between 1 and {} characters",
                MAX_TRANSFER_ID_LEN
            ),
        });
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError {
            code: "INVALID_TRANSFER_ID",
            message: format!("Transfer ID '{}' contains invalid characters", id),
        });
    }

    Ok(())
}
