use crate::config::{ServerConfig, StoreMode};
use crate::models::{TransferError, TransferRecord};
use crate::services::codec::Codec;
use crate::services::registry::{RegistryError, TransferRegistry};
use crate::utils::paths::ArtifactPaths;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

/// Request metadata extracted by the HTTP layer.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub transfer_id: String,
    pub filename: String,
    /// Declared body length, when the client sent one
    pub content_length: Option<u64>,
}

#[derive(Error, Debug)]
pub enum UploadError {
    /// The transfer was never registered
    #[error(transparent)]
    Rejected(#[from] RegistryError),

    /// The transfer was registered and ended in `failed`
    #[error("Transfer {id} failed: {error}")]
    Failed { id: String, error: TransferError },
}

/// Receiving half of the pipeline: body stream in, stored artifact out.
pub struct ReceiverService {
    registry: Arc<TransferRegistry>,
    codec: Arc<dyn Codec>,
    output_dir: PathBuf,
    store_as: StoreMode,
    read_timeout: Duration,
}

impl ReceiverService {
    pub fn new(config: &ServerConfig, registry: Arc<TransferRegistry>, codec: Arc<dyn Codec>) -> Self {
        Self {
            registry,
            codec,
            output_dir: config.output_dir.clone(),
            store_as: config.store_as,
            read_timeout: config.read_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    pub fn store_as(&self) -> StoreMode {
        self.store_as
    }

    /// Snapshot of a transfer, in whatever state it currently is.
    pub fn get_status(&self, transfer_id: &str) -> Option<TransferRecord> {
        self.registry.get(transfer_id)
    }

    /// Registers the transfer and drives it to a terminal state.
    ///
    /// The work runs on its own task: if the caller's future is dropped
    /// (client went away) the transfer still finishes or fails on its own,
    /// and its final state stays visible through the registry.
    pub async fn accept_upload<S, E>(
        self: &Arc<Self>,
        meta: UploadMeta,
        body: S,
    ) -> Result<TransferRecord, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
        E: Display + Send + 'static,
    {
        self.registry.create(&meta.transfer_id, &meta.filename)?;
        info!(
            "📥 Receiving {} (transfer_id={})",
            meta.filename, meta.transfer_id
        );

        let id = meta.transfer_id.clone();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_transfer(meta, body).await });

        match handle.await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(error)) => Err(UploadError::Failed { id, error }),
            Err(join_error) => {
                // The guard inside the task has already failed the record
                error!("Receiver task for {} aborted: {}", id, join_error);
                Err(UploadError::Failed {
                    id,
                    error: TransferError::StorageFailure("receiver task aborted".to_string()),
                })
            }
        }
    }

    async fn run_transfer<S, E>(&self, meta: UploadMeta, body: S) -> Result<TransferRecord, TransferError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let paths = ArtifactPaths::new(
            &self.output_dir,
            &meta.filename,
            &meta.transfer_id,
            self.store_as,
        );
        let guard = TransferGuard::new(Arc::clone(&self.registry), &meta.transfer_id, &paths);

        match self.drive(&meta, &paths, body).await {
            Ok(record) => {
                guard.complete();
                info!(
                    "✅ Stored {} as {} ({} bytes received, transfer_id={})",
                    meta.filename,
                    paths.final_path.display(),
                    record.bytes_received,
                    meta.transfer_id
                );
                Ok(record)
            }
            Err(err) => {
                error!("❌ Transfer {} failed: {}", meta.transfer_id, err);
                guard.fail(err.clone()).await;
                Err(err)
            }
        }
    }

    async fn drive<S, E>(
        &self,
        meta: &UploadMeta,
        paths: &ArtifactPaths,
        body: S,
    ) -> Result<TransferRecord, TransferError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let id = meta.transfer_id.as_str();
        let received = self.receive_body(meta, &paths.received, body).await?;
        info!(
            "Received {} ({} bytes, transfer_id={})",
            meta.filename, received, id
        );

        match self.store_as {
            StoreMode::Msz => {
                fs::rename(&paths.received, &paths.final_path)
                    .await
                    .map_err(|e| storage_error("moving artifact into place", e))?;
            }
            StoreMode::Mzml => {
                self.registry.mark_decompressing(id).map_err(registry_error)?;

                let codec = Arc::clone(&self.codec);
                let src = paths.received.clone();
                let dst = paths.decompressed.clone();
                let size = tokio::task::spawn_blocking(move || codec.decompress(&src, &dst))
                    .await
                    .map_err(|e| {
                        TransferError::DecompressionFailure(format!("decompression task failed: {}", e))
                    })?
                    .map_err(|e| TransferError::DecompressionFailure(e.to_string()))?;

                fs::rename(&paths.decompressed, &paths.final_path)
                    .await
                    .map_err(|e| storage_error("moving artifact into place", e))?;
                remove_if_exists(&paths.received).await;
                info!("Decompressed {} to {} ({} bytes)", id, paths.final_path.display(), size);
            }
        }

        self.registry
            .mark_stored(id, &paths.final_path, received)
            .map_err(registry_error)
    }

    /// Appends the body to `path` in arrival order, returning the byte count.
    async fn receive_body<S, E>(&self, meta: &UploadMeta, path: &Path, mut body: S) -> Result<u64, TransferError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| storage_error("creating receive file", e))?;

        let mut received: u64 = 0;
        loop {
            let next = tokio::time::timeout(self.read_timeout, body.next())
                .await
                .map_err(|_| {
                    TransferError::TransportFailure(format!(
                        "no data received for {}s after {} bytes",
                        self.read_timeout.as_secs(),
                        received
                    ))
                })?;

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| {
                TransferError::TransportFailure(format!(
                    "error receiving data after {} bytes: {}",
                    received, e
                ))
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| storage_error("writing received data", e))?;
            received += chunk.len() as u64;
            self.registry
                .record_progress(&meta.transfer_id, received)
                .map_err(registry_error)?;
        }

        if let Some(expected) = meta.content_length {
            if received != expected {
                return Err(TransferError::TransportFailure(format!(
                    "truncated body: received {} of {} bytes",
                    received, expected
                )));
            }
        }

        file.flush()
            .await
            .map_err(|e| storage_error("flushing received data", e))?;
        file.sync_all()
            .await
            .map_err(|e| storage_error("syncing received data", e))?;

        Ok(received)
    }
}

/// Fails the record and removes this transfer's intermediates unless
/// [`TransferGuard::complete`] was called. Runs on drop, so a torn-down
/// task cannot leave a record stuck in `receiving`.
struct TransferGuard {
    registry: Arc<TransferRegistry>,
    id: String,
    temporaries: Vec<PathBuf>,
    armed: bool,
}

impl TransferGuard {
    fn new(registry: Arc<TransferRegistry>, id: &str, paths: &ArtifactPaths) -> Self {
        Self {
            registry,
            id: id.to_string(),
            temporaries: paths.temporaries().iter().map(|p| p.to_path_buf()).collect(),
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }

    /// Cleans up on the async runtime, then records the failure.
    /// The synchronous path in `Drop` only runs for a torn-down task.
    async fn fail(mut self, error: TransferError) {
        self.armed = false;
        for path in &self.temporaries {
            remove_if_exists(path).await;
        }
        if let Err(e) = self.registry.mark_failed(&self.id, &error) {
            warn!("Could not mark transfer {} as failed: {}", self.id, e);
        }
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        for path in &self.temporaries {
            match std::fs::remove_file(path) {
                Ok(()) => info!("🧹 Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        let error =
            TransferError::TransportFailure("transfer aborted before completion".to_string());
        if let Err(e) = self.registry.mark_failed(&self.id, &error) {
            warn!("Could not mark transfer {} as failed: {}", self.id, e);
        }
    }
}

async fn remove_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => info!("🧹 Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

fn storage_error(action: &str, e: std::io::Error) -> TransferError {
    TransferError::StorageFailure(format!("{}: {}", action, e))
}

fn registry_error(e: RegistryError) -> TransferError {
    TransferError::StorageFailure(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, TransferState};
    use crate::services::codec::{SourceReader, ZlibCodec};
    use futures::TryStreamExt;
    use futures::stream;
    use std::io;

    fn service(dir: &Path, store_as: StoreMode) -> Arc<ReceiverService> {
        let config = ServerConfig::new(dir, store_as);
        Arc::new(ReceiverService::new(
            &config,
            Arc::new(TransferRegistry::new()),
            Arc::new(ZlibCodec::default()),
        ))
    }

    fn meta(id: &str, filename: &str, content_length: Option<u64>) -> UploadMeta {
        UploadMeta {
            transfer_id: id.to_string(),
            filename: filename.to_string(),
            content_length,
        }
    }

    fn body(chunks: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + Unpin + 'static {
        stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn compress(data: &[u8]) -> Vec<u8> {
        let reader: SourceReader = Box::new(std::io::Cursor::new(data.to_vec()));
        let chunks: Vec<Bytes> = ZlibCodec::default()
            .compress_stream(reader, 8)
            .try_collect()
            .await
            .unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_store_as_msz_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = service(dir.path(), StoreMode::Msz);

        let record = receiver
            .accept_upload(meta("t1", "run.msz", Some(10)), body(vec![b"01234", b"56789"]))
            .await
            .unwrap();

        assert_eq!(record.state, TransferState::Stored);
        assert_eq!(record.bytes_received, 10);
        assert_eq!(std::fs::read(dir.path().join("run.msz")).unwrap(), b"0123456789");
        assert_eq!(dir_entries(dir.path()), vec!["run.msz"]);
    }

    #[tokio::test]
    async fn test_store_as_mzml_decompresses_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = service(dir.path(), StoreMode::Mzml);
        let original = b"<mzML>twenty bytes</mzML>"[..20].to_vec();
        let compressed = compress(&original).await;
        let len = compressed.len() as u64;

        let stream = stream::iter(vec![Ok::<_, io::Error>(Bytes::from(compressed))]);
        let record = receiver
            .accept_upload(meta("t2", "run.mzML", Some(len)), stream)
            .await
            .unwrap();

        assert_eq!(record.state, TransferState::Stored);
        assert_eq!(record.bytes_received, len);
        assert_eq!(std::fs::read(dir.path().join("run.mzML")).unwrap(), original);
        assert_eq!(dir_entries(dir.path()), vec!["run.mzML"]);
    }

    #[tokio::test]
    async fn test_body_error_fails_and_removes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = service(dir.path(), StoreMode::Msz);
        let stream = stream::iter(vec![
            Ok(Bytes::from_static(b"12345")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
        ]);

        let err = receiver
            .accept_upload(meta("t3", "run.msz", Some(100)), stream)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Failed { error: TransferError::TransportFailure(_), .. }
        ));

        let record = receiver.registry().get("t3").unwrap();
        assert_eq!(record.state, TransferState::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::TransportFailure);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_short_body_is_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = service(dir.path(), StoreMode::Msz);

        let err = receiver
            .accept_upload(meta("t4", "run.msz", Some(100)), body(vec![b"12345"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("truncated"));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_payload_fails_decompression() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = service(dir.path(), StoreMode::Mzml);

        let err = receiver
            .accept_upload(meta("t5", "bad.msz", None), body(vec![b"not compressed at all"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Failed { error: TransferError::DecompressionFailure(_), .. }
        ));
        assert_eq!(
            receiver.registry().get("t5").unwrap().state,
            TransferState::Failed
        );
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = service(dir.path(), StoreMode::Msz);
        receiver
            .accept_upload(meta("dup", "a.msz", None), body(vec![b"a"]))
            .await
            .unwrap();

        let err = receiver
            .accept_upload(meta("dup", "b.msz", None), body(vec![b"b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Rejected(RegistryError::Duplicate(_))));
        assert_eq!(dir_entries(dir.path()), vec!["a.msz"]);
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::new(dir.path(), StoreMode::Msz);
        config.read_timeout = Duration::from_millis(50);
        let receiver = Arc::new(ReceiverService::new(
            &config,
            Arc::new(TransferRegistry::new()),
            Arc::new(ZlibCodec::default()),
        ));

        let stalled = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"abc"))])
            .chain(stream::pending());
        let err = receiver
            .accept_upload(meta("slow", "slow.msz", None), Box::pin(stalled))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no data received"));
        assert_eq!(receiver.registry().get("slow").unwrap().bytes_received, 3);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_guard_fail_removes_temporaries_before_recording() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(TransferRegistry::new());
        registry.create("g1", "run.msz").unwrap();
        let paths = ArtifactPaths::new(dir.path(), "run.msz", "g1", StoreMode::Mzml);
        for path in paths.temporaries() {
            std::fs::write(path, b"partial").unwrap();
        }

        let guard = TransferGuard::new(registry.clone(), "g1", &paths);
        guard
            .fail(TransferError::StorageFailure("disk full".to_string()))
            .await;

        assert!(dir_entries(dir.path()).is_empty());
        let record = registry.get("g1").unwrap();
        assert_eq!(record.state, TransferState::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::StorageFailure);
    }

    #[test]
    fn test_dropped_guard_fails_torn_down_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(TransferRegistry::new());
        registry.create("g2", "run.msz").unwrap();
        let paths = ArtifactPaths::new(dir.path(), "run.msz", "g2", StoreMode::Msz);
        std::fs::write(&paths.received, b"partial").unwrap();

        drop(TransferGuard::new(registry.clone(), "g2", &paths));

        assert!(dir_entries(dir.path()).is_empty());
        let record = registry.get("g2").unwrap();
        assert_eq!(record.state, TransferState::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::TransportFailure);
    }

    #[test]
    fn test_completed_guard_leaves_record_alone() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(TransferRegistry::new());
        registry.create("g3", "run.msz").unwrap();
        let paths = ArtifactPaths::new(dir.path(), "run.msz", "g3", StoreMode::Msz);

        TransferGuard::new(registry.clone(), "g3", &paths).complete();
        assert_eq!(registry.get("g3").unwrap().state, TransferState::Receiving);
    }
}
