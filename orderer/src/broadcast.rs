//! Broadcast stream handling

use crate::metrics::Metrics;
use crate::pb::{self, BroadcastRequest, BroadcastResponse};
use crate::sequencer::SequencerHandle;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

/// Reads requests from a Broadcast stream, orders them, and answers each one
#[derive(Clone, Debug)]
pub struct BroadcastHandler {
    sequencer: SequencerHandle,
    metrics: Metrics,
    max_payload_size: usize,
}

impl BroadcastHandler {
    /// Create new handler
    pub fn new(sequencer: SequencerHandle, metrics: Metrics, max_payload_size: usize) -> Self {
        Self {
            sequencer,
            metrics,
            max_payload_size,
        }
    }

    /// Serve one stream until EOF, a receive error, or a non-`SUCCESS` answer
    pub async fn handle<S>(
        &self,
        mut requests: S,
        responses: mpsc::Sender<Result<BroadcastResponse, Status>>,
    ) where
        S: Stream<Item = Result<BroadcastRequest, Status>> + Unpin,
    {
        tracing::debug!("Starting new broadcast loop");

        loop {
            let msg = match requests.next().await {
                None => {
                    tracing::debug!("Received EOF, hangup");
                    return;
                }
                Some(Err(status)) => {
                    tracing::warn!(err = %status, "Error receiving");
                    let _ = responses.send(Err(status)).await;
                    return;
                }
                Some(Ok(msg)) => msg,
            };

            let resp = self.process_message(msg).await;
            let success = resp.status() == pb::Status::Success;

            if responses.send(Ok(resp)).await.is_err() {
                tracing::warn!("Error sending, client hung up");
                return;
            }
            if !success {
                return;
            }
        }
    }

    /// Validate a single request and hand it to the sequencer
    pub async fn process_message(&self, msg: BroadcastRequest) -> BroadcastResponse {
        if msg.payload.is_empty() {
            return self.reject("empty payload".to_string());
        }

        if msg.payload.len() > self.max_payload_size {
            return self.reject(format!(
                "payload of {} bytes exceeds limit of {} bytes",
                msg.payload.len(),
                self.max_payload_size
            ));
        }

        match self.sequencer.submit(msg.payload).await {
            Ok(receipt) => {
                self.metrics.record_transaction_received();
                tracing::trace!(sequence = receipt.sequence, "Transaction accepted");
                BroadcastResponse::with_status(pb::Status::Success, hex::encode(receipt.txid))
            }
            Err(e) => {
                tracing::warn!(err = %e, "Sequencer rejected transaction");
                self.reject(format!("ordering unavailable: {}", e))
            }
        }
    }

    fn reject(&self, info: String) -> BroadcastResponse {
        self.metrics.record_transaction_rejected();
        tracing::debug!(%info, "Rejecting broadcast request");
        BroadcastResponse::with_status(pb::Status::Invalid, info)
    }
}
