//! Deliver stream handling

use crate::metrics::Metrics;
use crate::pb::{self, DeliverRequest, DeliverResponse};
use crate::sequencer::SequencerHandle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

/// Streams ordered transaction ids to a subscriber
#[derive(Clone, Debug)]
pub struct DeliverHandler {
    sequencer: SequencerHandle,
    metrics: Metrics,
}

/// Keeps the open-stream gauge balanced on every exit path
struct StreamGuard<'a>(&'a Metrics);

impl<'a> StreamGuard<'a> {
    fn open(metrics: &'a Metrics) -> Self {
        metrics.deliver_stream_opened();
        Self(metrics)
    }
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.0.deliver_stream_closed();
    }
}

impl DeliverHandler {
    /// Create new handler
    pub fn new(sequencer: SequencerHandle, metrics: Metrics) -> Self {
        Self { sequencer, metrics }
    }

    /// Serve one stream
    ///
    /// The first request subscribes the stream and is acknowledged with
    /// `SUCCESS`; every transaction ordered afterwards is sent as a `txid`.
    /// Ends on client EOF or hang-up, a receive error, sequencer shutdown, or
    /// after telling a lagging subscriber `INVALID`.
    pub async fn handle<S>(
        &self,
        mut requests: S,
        responses: mpsc::Sender<Result<DeliverResponse, Status>>,
    ) where
        S: Stream<Item = Result<DeliverRequest, Status>> + Unpin,
    {
        let _guard = StreamGuard::open(&self.metrics);
        tracing::debug!("Starting new deliver loop");

        match requests.next().await {
            None => {
                tracing::debug!("Received EOF, hangup");
                return;
            }
            Some(Err(status)) => {
                tracing::warn!(err = %status, "Error reading");
                let _ = responses.send(Err(status)).await;
                return;
            }
            Some(Ok(_)) => {}
        }

        let mut ordered = match self.sequencer.subscribe().await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(err = %e, "Unable to subscribe to ordered transactions");
                let _ = responses
                    .send(Ok(DeliverResponse::with_status(pb::Status::Invalid)))
                    .await;
                return;
            }
        };

        if responses
            .send(Ok(DeliverResponse::with_status(pb::Status::Success)))
            .await
            .is_err()
        {
            return;
        }

        loop {
            tokio::select! {
                tx = ordered.recv() => match tx {
                    Ok(tx) => {
                        if responses.send(Ok(DeliverResponse::with_txid(tx.txid))).await.is_err() {
                            tracing::debug!("Error sending, client hung up");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Deliver subscriber lagged");
                        let _ = responses
                            .send(Ok(DeliverResponse::with_status(pb::Status::Invalid)))
                            .await;
                        return;
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Sequencer stopped, closing deliver stream");
                        return;
                    }
                },

                msg = requests.next() => match msg {
                    None => {
                        tracing::debug!("Received EOF, hangup");
                        return;
                    }
                    Some(Err(status)) => {
                        tracing::warn!(err = %status, "Error reading");
                        let _ = responses.send(Err(status)).await;
                        return;
                    }
                    // Already subscribed
                    Some(Ok(_)) => {
                        if responses
                            .send(Ok(DeliverResponse::with_status(pb::Status::Success)))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                },

                _ = responses.closed() => {
                    tracing::debug!("Client hung up");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::deliver_response::Type;
    use crate::sequencer::{spawn_sequencer, SequencerConfig};
    use std::time::Duration;
    use tokio_stream::wrappers::ReceiverStream;

    type Requests = mpsc::Sender<Result<DeliverRequest, Status>>;
    type Responses = mpsc::Receiver<Result<DeliverResponse, Status>>;

    fn setup(subscriber_buffer: usize) -> (DeliverHandler, SequencerHandle, Metrics) {
        let metrics = Metrics::new().unwrap();
        let config = SequencerConfig {
            batch_timeout: Duration::from_secs(60),
            subscriber_buffer,
            ..SequencerConfig::default()
        };
        let sequencer = spawn_sequencer(&config, metrics.clone());
        let handler = DeliverHandler::new(sequencer.clone(), metrics.clone());
        (handler, sequencer, metrics)
    }

    fn start(handler: &DeliverHandler) -> (Requests, Responses, tokio::task::JoinHandle<()>) {
        let (req_tx, req_rx) = mpsc::channel(8);
        let (resp_tx, resp_rx) = mpsc::channel(8);
        let handler = handler.clone();
        let task = tokio::spawn(async move {
            handler.handle(ReceiverStream::new(req_rx), resp_tx).await;
        });
        (req_tx, resp_rx, task)
    }

    async fn next(responses: &mut Responses) -> Option<Result<DeliverResponse, Status>> {
        tokio::time::timeout(Duration::from_secs(5), responses.recv())
            .await
            .expect("timed out waiting for deliver response")
    }

    fn subscribe_request() -> Result<DeliverRequest, Status> {
        Ok(DeliverRequest::default())
    }

    #[tokio::test]
    async fn test_deliver_streams_txids_after_ack() {
        let (handler, sequencer, metrics) = setup(64);
        let (requests, mut responses, task) = start(&handler);

        requests.send(subscribe_request()).await.unwrap();
        let ack = next(&mut responses).await.unwrap().unwrap();
        assert_eq!(ack, DeliverResponse::with_status(pb::Status::Success));
        assert_eq!(metrics.deliver_streams.get(), 1);

        let a = sequencer.submit(b"inputA".to_vec()).await.unwrap();
        let b = sequencer.submit(b"inputB".to_vec()).await.unwrap();
        sequencer.flush().await.unwrap();

        for expected in [a.txid, b.txid] {
            let resp = next(&mut responses).await.unwrap().unwrap();
            assert_eq!(resp.r#type, Some(Type::Txid(expected)));
        }

        drop(requests);
        task.await.unwrap();
        assert_eq!(metrics.deliver_streams.get(), 0);

        sequencer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_ends_on_sequencer_shutdown() {
        let (handler, sequencer, _) = setup(64);
        let (requests, mut responses, task) = start(&handler);

        requests.send(subscribe_request()).await.unwrap();
        next(&mut responses).await.unwrap().unwrap();

        sequencer.submit(b"final".to_vec()).await.unwrap();
        sequencer.shutdown().await.unwrap();

        let resp = next(&mut responses).await.unwrap().unwrap();
        assert!(matches!(resp.r#type, Some(Type::Txid(_))));
        assert!(next(&mut responses).await.is_none());

        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_lagged_subscriber_is_invalid() {
        let (handler, sequencer, _) = setup(2);
        let (requests, mut responses, task) = start(&handler);

        requests.send(subscribe_request()).await.unwrap();
        next(&mut responses).await.unwrap().unwrap();

        // Outrun the subscriber: more transactions than the response channel
        // and the broadcast buffer can hold
        for i in 0..32u32 {
            sequencer.submit(i.to_be_bytes().to_vec()).await.unwrap();
        }
        sequencer.flush().await.unwrap();

        let mut last = None;
        while let Some(resp) = next(&mut responses).await {
            last = Some(resp.unwrap());
        }
        assert_eq!(last, Some(DeliverResponse::with_status(pb::Status::Invalid)));

        task.await.unwrap();
        drop(requests);
        sequencer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_eof_before_subscribe() {
        let (handler, sequencer, metrics) = setup(64);
        let (requests, mut responses, task) = start(&handler);

        drop(requests);
        assert!(next(&mut responses).await.is_none());
        task.await.unwrap();
        assert_eq!(metrics.deliver_streams.get(), 0);

        sequencer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_ends_when_client_hangs_up() {
        let (handler, sequencer, _) = setup(64);
        let (requests, mut responses, task) = start(&handler);

        requests.send(subscribe_request()).await.unwrap();
        next(&mut responses).await.unwrap().unwrap();

        drop(responses);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        drop(requests);
        sequencer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_forwards_receive_error() {
        let (handler, sequencer, _) = setup(64);
        let (requests, mut responses, task) = start(&handler);

        requests.send(subscribe_request()).await.unwrap();
        next(&mut responses).await.unwrap().unwrap();

        requests.send(Err(Status::cancelled("gone"))).await.unwrap();
        let err = next(&mut responses).await.unwrap().unwrap_err();
        assert_eq!(err.code(), tonic::Code::Cancelled);
        assert!(next(&mut responses).await.is_none());

        task.await.unwrap();
        sequencer.shutdown().await.unwrap();
    }
}
