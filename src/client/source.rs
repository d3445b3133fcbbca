use crate::models::{Format, TransferError};
use crate::services::codec::SourceReader;
use std::fmt;
use std::path::{Path, PathBuf};

/// One thing to send. Classified once, when it is built.
pub enum TransferSource {
    /// A file on disk, opened when its upload starts
    Path { path: PathBuf, format: Format },
    /// An already opened reader, sent under `name`
    Handle {
        name: String,
        format: Format,
        reader: SourceReader,
    },
}

impl TransferSource {
    /// Classifies `path` by extension. Anything but mzML/msz/mszx is rejected.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let path = path.into();
        let format = Format::from_path(&path)
            .ok_or_else(|| TransferError::UnsupportedFormat(path.display().to_string()))?;
        Ok(TransferSource::Path { path, format })
    }

    pub fn from_reader(name: impl Into<String>, format: Format, reader: SourceReader) -> Self {
        TransferSource::Handle {
            name: name.into(),
            format,
            reader,
        }
    }

    pub fn format(&self) -> Format {
        match self {
            TransferSource::Path { format, .. } | TransferSource::Handle { format, .. } => *format,
        }
    }

    /// Name sent as `X-Original-Filename`.
    pub fn file_name(&self) -> String {
        match self {
            TransferSource::Path { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            TransferSource::Handle { name, .. } => name.clone(),
        }
    }

    /// Opens the source for reading. The size is known for paths only.
    pub(crate) async fn open(self) -> Result<(SourceReader, Option<u64>), TransferError> {
        match self {
            TransferSource::Path { path, .. } => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    TransferError::TransportFailure(format!("cannot open {}: {}", path.display(), e))
                })?;
                let size = file.metadata().await.ok().map(|m| m.len());
                Ok((Box::new(file), size))
            }
            TransferSource::Handle { reader, .. } => Ok((reader, None)),
        }
    }
}

impl fmt::Debug for TransferSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferSource::Path { path, format } => f
                .debug_struct("Path")
                .field("path", path)
                .field("format", format)
                .finish(),
            TransferSource::Handle { name, format, .. } => f
                .debug_struct("Handle")
                .field("name", name)
                .field("format", format)
                .finish_non_exhaustive(),
        }
    }
}

/// Batch element: a raw path is classified when its turn comes, so an
/// unsupported file becomes a failed outcome instead of aborting the batch.
#[derive(Debug)]
pub enum SendInput {
    Path(PathBuf),
    Source(TransferSource),
}

impl SendInput {
    /// Label used in outcomes and logs.
    pub fn label(&self) -> String {
        match self {
            SendInput::Path(path) => path.display().to_string(),
            SendInput::Source(TransferSource::Path { path, .. }) => path.display().to_string(),
            SendInput::Source(source) => source.file_name(),
        }
    }

    pub fn into_source(self) -> Result<TransferSource, TransferError> {
        match self {
            SendInput::Path(path) => TransferSource::from_path(path),
            SendInput::Source(source) => Ok(source),
        }
    }
}

impl From<PathBuf> for SendInput {
    fn from(path: PathBuf) -> Self {
        SendInput::Path(path)
    }
}

impl From<&Path> for SendInput {
    fn from(path: &Path) -> Self {
        SendInput::Path(path.to_path_buf())
    }
}

impl From<TransferSource> for SendInput {
    fn from(source: TransferSource) -> Self {
        SendInput::Source(source)
    }
}
