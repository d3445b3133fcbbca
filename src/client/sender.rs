use crate::client::endpoint::Endpoint;
use crate::client::source::{SendInput, TransferSource};
use crate::config::ClientConfig;
use crate::models::{
    ErrorKind, HealthResponse, TransferError, TransferRecord, TransferState, UploadResponse,
};
use crate::services::codec::{ByteStream, Codec, SourceReader, ZlibCodec};
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::error::Error as StdError;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::io::{InspectReader, ReaderStream};
use tracing::{error, info};
use uuid::Uuid;

/// Observer for batch progress. Indices are positions in the batch input.
pub trait ProgressCallback: Send + Sync {
    /// `total_bytes` is the source size when known.
    fn file_started(&self, _index: usize, _name: &str, _total_bytes: Option<u64>) {}

    /// Called with the number of source bytes read since the last call.
    fn file_progress(&self, _index: usize, _delta: u64) {}

    fn file_done(&self, _index: usize, _response: &UploadResponse) {}

    fn file_error(&self, _index: usize, _error: &TransferError) {}
}

/// Result of sending one input.
#[derive(Debug)]
pub struct TransferOutcome {
    pub index: usize,
    pub input: String,
    pub result: Result<UploadResponse, TransferError>,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    kind: Option<ErrorKind>,
}

/// Sending half of the pipeline, bound to one receiver.
pub struct Sender {
    client: Client,
    endpoint: Endpoint,
    codec: Arc<dyn Codec>,
    config: ClientConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl Sender {
    pub fn new(endpoint: Endpoint, config: ClientConfig) -> Result<Self, TransferError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                TransferError::TransportFailure(format!("cannot build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            codec: Arc::new(ZlibCodec::default()),
            config,
            progress: None,
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET /v1/health`, used as a pre-flight check before a batch.
    pub async fn check_health(&self) -> Result<HealthResponse, TransferError> {
        let response = self
            .client
            .get(self.endpoint.health_url())
            .timeout(self.config.connect_timeout)
            .send()
            .await
            .map_err(|e| {
                TransferError::TransportFailure(format!(
                    "cannot reach {}: {}",
                    self.endpoint,
                    error_chain(&e)
                ))
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response.json().await.map_err(|e| {
            TransferError::TransportFailure(format!("invalid health response: {}", e))
        })
    }

    /// Sends one input in a single request.
    pub async fn send_file(&self, input: impl Into<SendInput>) -> TransferOutcome {
        self.send_indexed(0, input.into()).await
    }

    /// Sends every input with at most `parallelism` uploads in flight.
    /// Yields one outcome per input, in completion order.
    pub async fn send_batch<I>(&self, inputs: I, parallelism: usize) -> Vec<TransferOutcome>
    where
        I: IntoIterator,
        I::Item: Into<SendInput>,
    {
        let parallelism = parallelism.max(1);
        info!(
            "🚀 Sending batch to {} ({} in parallel)",
            self.endpoint, parallelism
        );

        futures::stream::iter(inputs.into_iter().enumerate())
            .map(|(index, input)| self.send_indexed(index, input.into()))
            .buffer_unordered(parallelism)
            .collect()
            .await
    }

    async fn send_indexed(&self, index: usize, input: SendInput) -> TransferOutcome {
        let label = input.label();
        let result = match input.into_source() {
            Ok(source) => self.upload(index, source).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(response) => {
                info!(
                    "✅ Sent {} (transfer_id={}, {} bytes stored)",
                    label, response.id, response.bytes_received
                );
                if let Some(progress) = &self.progress {
                    progress.file_done(index, response);
                }
            }
            Err(e) => {
                error!("❌ Failed to send {}: {}", label, e);
                if let Some(progress) = &self.progress {
                    progress.file_error(index, e);
                }
            }
        }

        TransferOutcome {
            index,
            input: label,
            result,
        }
    }

    async fn upload(
        &self,
        index: usize,
        source: TransferSource,
    ) -> Result<UploadResponse, TransferError> {
        let format = source.format();
        let filename = source.file_name();
        let transfer_id = Uuid::new_v4().to_string();

        let filename_header = HeaderValue::from_bytes(filename.as_bytes()).map_err(|_| {
            TransferError::TransportFailure(format!("file name {:?} cannot be sent", filename))
        })?;

        let (reader, total) = source.open().await?;
        if let Some(progress) = &self.progress {
            progress.file_started(index, &filename, total);
        }
        let reader = self.counting(index, reader);

        // Set by the body stream if the codec fails mid-request
        let compression_error: Arc<OnceLock<String>> = Arc::default();
        let body: ByteStream = if format.is_compressed() {
            ReaderStream::with_capacity(reader, self.config.chunk_size).boxed()
        } else {
            let slot = compression_error.clone();
            self.codec
                .compress_stream(reader, self.config.chunk_size)
                .inspect_err(move |e| {
                    let _ = slot.set(e.to_string());
                })
                .boxed()
        };

        info!(
            "📤 Sending {} as {} (transfer_id={}, {})",
            filename,
            format,
            transfer_id,
            if format.is_compressed() {
                "streaming as-is"
            } else {
                "compressing on the fly"
            }
        );

        let sent = self
            .client
            .post(self.endpoint.upload_url())
            .header("X-Transfer-ID", transfer_id.as_str())
            .header("X-Original-Filename", filename_header)
            .header("X-Source-Format", format.as_str())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                return Err(match compression_error.get() {
                    Some(detail) => TransferError::CompressionFailure(detail.clone()),
                    None => TransferError::TransportFailure(error_chain(&e)),
                });
            }
        };

        if !response.status().is_success() {
            if let Some(detail) = compression_error.get() {
                return Err(TransferError::CompressionFailure(detail.clone()));
            }
            return Err(error_from_response(response).await);
        }

        let uploaded: UploadResponse = response.json().await.map_err(|e| {
            TransferError::TransportFailure(format!("invalid upload response: {}", e))
        })?;

        match uploaded.state {
            TransferState::Stored => Ok(uploaded),
            TransferState::Failed => Err(TransferError::TransportFailure(format!(
                "receiver reported transfer {} as failed",
                uploaded.id
            ))),
            _ => {
                let record = self.poll_status(&uploaded.id, self.config.timeout).await?;
                settle(record)
            }
        }
    }

    /// `GET /v1/transfer/{id}/status`. `None` when the receiver does not know the id.
    pub async fn fetch_status(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransferRecord>, TransferError> {
        let response = self
            .client
            .get(self.endpoint.status_url(transfer_id))
            .timeout(self.config.connect_timeout)
            .send()
            .await
            .map_err(|e| TransferError::TransportFailure(error_chain(&e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response.json().await.map(Some).map_err(|e| {
            TransferError::TransportFailure(format!("invalid status response: {}", e))
        })
    }

    /// Polls until the transfer is terminal. The deadline restarts whenever
    /// the state changes or more bytes have arrived.
    pub async fn poll_status(
        &self,
        transfer_id: &str,
        timeout: Duration,
    ) -> Result<TransferRecord, TransferError> {
        let mut deadline = Instant::now() + timeout;
        let mut last_seen: Option<(TransferState, u64)> = None;

        loop {
            if let Some(record) = self.fetch_status(transfer_id).await? {
                if record.state.is_terminal() {
                    return Ok(record);
                }

                let seen = (record.state, record.bytes_received);
                let advanced = last_seen
                    .is_none_or(|(state, bytes)| state != seen.0 || bytes < seen.1);
                if advanced {
                    last_seen = Some(seen);
                    deadline = Instant::now() + timeout;
                }
            }

            if Instant::now() >= deadline {
                return Err(TransferError::TransportFailure(format!(
                    "transfer {} did not complete within {:?}",
                    transfer_id, timeout
                )));
            }
            sleep(self.config.poll_interval).await;
        }
    }

    fn counting(&self, index: usize, reader: SourceReader) -> SourceReader {
        match &self.progress {
            None => reader,
            Some(progress) => {
                let progress = progress.clone();
                Box::new(InspectReader::new(reader, move |buf: &[u8]| {
                    progress.file_progress(index, buf.len() as u64)
                }))
            }
        }
    }
}

fn settle(record: TransferRecord) -> Result<UploadResponse, TransferError> {
    match (record.state, record.error.clone()) {
        (TransferState::Stored, _) => Ok(record.into()),
        (_, Some(detail)) => Err(TransferError::from_kind(detail.kind, detail.detail)),
        (state, None) => Err(TransferError::TransportFailure(format!(
            "transfer {} ended in state {}",
            record.id, state
        ))),
    }
}

/// Maps a non-2xx response back onto the error taxonomy when the body
/// carries a `kind`.
async fn error_from_response(response: Response) -> TransferError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            error,
            kind: Some(kind),
        }) => TransferError::from_kind(kind, error),
        Ok(ErrorBody { error, kind: None }) => {
            TransferError::TransportFailure(format!("HTTP {}: {}", status, error))
        }
        Err(_) => TransferError::TransportFailure(format!("HTTP {}: {}", status, text.trim())),
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
