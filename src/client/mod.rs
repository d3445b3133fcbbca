pub mod discovery;
pub mod endpoint;
pub mod progress;
pub mod sender;
pub mod source;

pub use endpoint::Endpoint;
pub use sender::{ProgressCallback, Sender, TransferOutcome};
pub use source::{SendInput, TransferSource};

use crate::config::ClientConfig;

/// Sends a single input to `endpoint` with default client settings.
pub async fn send_file(input: impl Into<SendInput>, endpoint: &Endpoint) -> TransferOutcome {
    let input = input.into();
    match Sender::new(endpoint.clone(), ClientConfig::default()) {
        Ok(sender) => sender.send_file(input).await,
        Err(error) => TransferOutcome {
            index: 0,
            input: input.label(),
            result: Err(error),
        },
    }
}

/// Sends `inputs` to `endpoint` with at most `parallelism` uploads in flight.
pub async fn send_batch<I>(inputs: I, endpoint: &Endpoint, parallelism: usize) -> Vec<TransferOutcome>
where
    I: IntoIterator,
    I::Item: Into<SendInput>,
{
    match Sender::new(endpoint.clone(), ClientConfig::default()) {
        Ok(sender) => sender.send_batch(inputs, parallelism).await,
        Err(error) => inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                let input: SendInput = input.into();
                TransferOutcome {
                    index,
                    input: input.label(),
                    result: Err(error.clone()),
                }
            })
            .collect(),
    }
}
