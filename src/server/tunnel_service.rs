//! The gRPC-facing half of the gateway: implements the `Tunnel` service's
//! `Register` RPC by wiring a fresh [`Proxier`] into the peer registry and
//! pumping frames between the bidirectional stream and the Proxier.
//!
//! Grounded on the original `proxyServer.Register` handler: accept the
//! stream, install the peer, spawn a reader that drains incoming
//! `ResponseFrame`s into the Proxier, and let the Proxier's outbox drive the
//! outbound `RequestFrame` stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::identity::extract_peer_id;
use crate::proxier::Proxier;
use crate::rpc::tunnel::tunnel_server::Tunnel;
use crate::rpc::tunnel::{RequestFrame, ResponseFrame};
use crate::server::GatewayState;

pub struct TunnelService {
    state: GatewayState,
}

impl TunnelService {
    pub fn new(state: GatewayState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl Tunnel for TunnelService {
    type RegisterStream = ReceiverStream<Result<RequestFrame, Status>>;

    async fn register(
        &self,
        request: Request<Streaming<ResponseFrame>>,
    ) -> Result<Response<Self::RegisterStream>, Status> {
        let peer_id = extract_peer_id(request.metadata())?;
        let tenant = self
            .state
            .tenancy
            .extract_from_stream_metadata(request.metadata())
            .map_err(Status::from)?;

        let (proxier, mut outbox_rx) = Proxier::new(self.state.config.tunnel.outbox_capacity);
        let proxier = Arc::new(proxier);

        let displaced = self.state.registry.register(&tenant, &peer_id, proxier.clone());
        if let Some(displaced) = displaced {
            metrics::counter!("tunnel_peer_displacements_total").increment(1);
            displaced.close();
        }
        metrics::counter!("tunnel_peer_registrations_total").increment(1);
        metrics::gauge!("tunnel_peers_registered").increment(1.0);
        tracing::info!("tunnel: peer registered, peer_id={}, tenant={}", peer_id, tenant);

        let mut inbound = request.into_inner();

        // Drains the peer's ResponseFrames into the Proxier's pending table.
        // When the stream ends (cleanly or with an error) the peer is gone:
        // close the Proxier and evict it, guarding against a newer
        // registration of the same id having already taken its place.
        {
            let proxier = proxier.clone();
            let registry = self.state.registry.clone();
            let tenant = tenant.clone();
            let peer_id = peer_id.clone();
            tokio::spawn(async move {
                loop {
                    match inbound.message().await {
                        Ok(Some(frame)) => proxier.deliver_response(frame.id, frame.response),
                        Ok(None) => break,
                        Err(status) => {
                            tracing::warn!("tunnel: peer stream error, peer_id={}, status={}", peer_id, status);
                            break;
                        }
                    }
                }
                proxier.close();
                registry.evict_if_current(&tenant, &peer_id, &proxier);
                metrics::gauge!("tunnel_peers_registered").decrement(1.0);
                tracing::info!("tunnel: peer deregistered, peer_id={}, tenant={}", peer_id, tenant);
            });
        }

        // Forwards the Proxier's outbox onto the gRPC response stream. Ends
        // (and, symmetrically, tears the Proxier down) when either side
        // closes: `recv` returns `None` once `close()` drops the Proxier's
        // sender, and `send` fails once the peer's connection is gone.
        let (tx, rx) = mpsc::channel(self.state.config.tunnel.outbox_capacity);
        let cleanup_proxier = proxier.clone();
        let registry = self.state.registry.clone();
        let tenant_for_cleanup = tenant.clone();
        let peer_id_for_cleanup = peer_id.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbox_rx.recv().await {
                if tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            cleanup_proxier.close();
            registry.evict_if_current(&tenant_for_cleanup, &peer_id_for_cleanup, &cleanup_proxier);
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
