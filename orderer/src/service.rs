//! gRPC service wiring
//!
//! Each Broadcast or Deliver call gets its own task. The task reads from the
//! request stream and writes into a bounded channel whose receiver is the
//! response stream, so a slow client pushes back on its own task only.

use crate::broadcast::BroadcastHandler;
use crate::config::{ServerConfig, TlsConfig};
use crate::deliver::DeliverHandler;
use crate::metrics::Metrics;
use crate::pb::atomic_broadcast_api_server::{AtomicBroadcastApi, AtomicBroadcastApiServer};
use crate::pb::{BroadcastRequest, BroadcastResponse, DeliverRequest, DeliverResponse};
use crate::sequencer::SequencerHandle;
use crate::{Error, Result};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::server::Router;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

/// Responses buffered per stream before the handler task waits on the client
const RESPONSE_BUFFER: usize = 64;

/// Implements the `orderer.AtomicBroadcastAPI` gRPC interface
#[derive(Clone, Debug)]
pub struct AtomicBroadcastService {
    broadcast: BroadcastHandler,
    deliver: DeliverHandler,
}

impl AtomicBroadcastService {
    /// Create new service
    pub fn new(sequencer: SequencerHandle, metrics: Metrics, max_payload_size: usize) -> Self {
        Self {
            broadcast: BroadcastHandler::new(sequencer.clone(), metrics.clone(), max_payload_size),
            deliver: DeliverHandler::new(sequencer, metrics),
        }
    }

    /// Wrap in a tonic server applying the configured message limits
    pub fn into_server(self, config: &ServerConfig) -> AtomicBroadcastApiServer<Self> {
        AtomicBroadcastApiServer::new(self)
            .max_decoding_message_size(config.max_recv_message_size)
            .max_encoding_message_size(config.max_send_message_size)
    }
}

fn remote_addr<T>(request: &Request<T>) -> String {
    request
        .remote_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_default()
}

#[tonic::async_trait]
impl AtomicBroadcastApi for AtomicBroadcastService {
    type BroadcastStream = ReceiverStream<std::result::Result<BroadcastResponse, Status>>;
    type DeliverStream = ReceiverStream<std::result::Result<DeliverResponse, Status>>;

    async fn broadcast(
        &self,
        request: Request<Streaming<BroadcastRequest>>,
    ) -> std::result::Result<Response<Self::BroadcastStream>, Status> {
        let span = tracing::debug_span!("broadcast", addr = %remote_addr(&request));
        let requests = request.into_inner();
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

        let handler = self.broadcast.clone();
        tokio::spawn(
            async move {
                handler.handle(requests, tx).await;
                tracing::debug!("Closing Broadcast stream");
            }
            .instrument(span),
        );

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn deliver(
        &self,
        request: Request<Streaming<DeliverRequest>>,
    ) -> std::result::Result<Response<Self::DeliverStream>, Status> {
        let span = tracing::debug_span!("deliver", addr = %remote_addr(&request));
        let requests = request.into_inner();
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

        let handler = self.deliver.clone();
        tokio::spawn(
            async move {
                handler.handle(requests, tx).await;
                tracing::debug!("Closing Deliver stream");
            }
            .instrument(span),
        );

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Server identity from the configured PEM files, if TLS is enabled
pub fn load_tls(config: &TlsConfig) -> Result<Option<ServerTlsConfig>> {
    match (&config.cert_file, &config.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let cert = std::fs::read(cert_file).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", cert_file.display(), e))
            })?;
            let key = std::fs::read(key_file).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", key_file.display(), e))
            })?;
            Ok(Some(ServerTlsConfig::new().identity(Identity::from_pem(cert, key))))
        }
        (None, None) => Ok(None),
        _ => Err(Error::Config(
            "tls requires both cert_file and key_file".to_string(),
        )),
    }
}

/// Build the gRPC router for `service`
pub fn router(config: &ServerConfig, service: AtomicBroadcastService) -> Result<Router> {
    let mut builder = Server::builder()
        .http2_keepalive_interval(Some(config.conn_timeout()))
        .http2_keepalive_timeout(Some(config.conn_timeout()));

    if let Some(tls) = load_tls(&config.tls)? {
        builder = builder.tls_config(tls)?;
        tracing::info!("TLS enabled");
    }

    Ok(builder.add_service(service.into_server(config)))
}
