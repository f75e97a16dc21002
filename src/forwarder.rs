//! The peer-side Forwarder (§4.4): drives the `Register` RPC, dispatching
//! each inbound `RequestFrame` to a local HTTP handler and returning the
//! matching `ResponseFrame`.
//!
//! Modeled on the Go client's `Forward()`: a single stream owns the
//! response-sending side, while each request is handled by its own spawned
//! task so that a slow or hung local handler never blocks delivery of
//! other requests' responses (§4.4 "Concurrency").

use std::fmt;

use bytes::Bytes;
use http::{StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;

use crate::identity::inject_peer_id;
use crate::rpc::tunnel::tunnel_client::TunnelClient;
use crate::rpc::tunnel::{RequestFrame, ResponseFrame};
use crate::wire;

/// Bound on the outbound response channel. Responses are produced as fast as
/// the local handler answers them; this only caps how far the sender can lag
/// the workers before `send` starts applying backpressure.
const OUTBOX_CAPACITY: usize = 64;

#[derive(Debug)]
pub enum ForwarderError {
    Connect(String),
    Registration(String),
    StreamEnded,
}

impl fmt::Display for ForwarderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwarderError::Connect(msg) => write!(f, "connect error: {msg}"),
            ForwarderError::Registration(msg) => write!(f, "registration failed: {msg}"),
            ForwarderError::StreamEnded => write!(f, "gateway closed the stream"),
        }
    }
}

impl std::error::Error for ForwarderError {}

/// Forwards tunneled requests to a local HTTP handler at `target_addr`
/// (host:port, plain HTTP).
pub struct Forwarder {
    target_addr: String,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl Forwarder {
    pub fn new(target_addr: impl Into<String>) -> Self {
        Self {
            target_addr: target_addr.into(),
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
        }
    }

    /// Registers `peer_id` on `channel` and serves requests until the stream
    /// ends or the gateway closes it. Returns normally on a clean shutdown,
    /// i.e. the inbound stream simply running out (peer-initiated
    /// disconnects are handled by the caller dropping the channel).
    pub async fn run(&self, peer_id: &str, channel: Channel) -> Result<(), ForwarderError> {
        let mut client = TunnelClient::new(channel);

        let (resp_tx, resp_rx) = mpsc::channel::<ResponseFrame>(OUTBOX_CAPACITY);
        let mut request = tonic::Request::new(ReceiverStream::new(resp_rx));
        inject_peer_id(request.metadata_mut(), peer_id)
            .map_err(|e| ForwarderError::Registration(e.to_string()))?;

        let mut inbound = client
            .register(request)
            .await
            .map_err(|e| ForwarderError::Registration(e.to_string()))?
            .into_inner();

        tracing::info!("forwarder: registered with gateway, peer_id={}", peer_id);

        loop {
            let frame = match inbound.message().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!("forwarder: gateway closed the stream, peer_id={}", peer_id);
                    return Ok(());
                }
                Err(status) => {
                    tracing::warn!(
                        "forwarder: stream error from gateway, peer_id={}, status={}",
                        peer_id,
                        status
                    );
                    return Err(ForwarderError::StreamEnded);
                }
            };

            let target_addr = self.target_addr.clone();
            let client = self.client.clone();
            let resp_tx = resp_tx.clone();
            tokio::spawn(async move {
                let response = handle_request(&client, &target_addr, frame).await;
                // If this fails the stream is on its way down; the gateway
                // will already be tearing down this Proxier.
                let _ = resp_tx.send(response).await;
            });
        }
    }
}

async fn handle_request(
    client: &Client<HttpConnector, Full<Bytes>>,
    target_addr: &str,
    frame: RequestFrame,
) -> ResponseFrame {
    let id = frame.id;
    match proxy_once(client, target_addr, &frame.request).await {
        Ok(raw_response) => ResponseFrame {
            id,
            response: raw_response,
        },
        Err(e) => ResponseFrame {
            id,
            response: wire::write_response(&error_response(&e)),
        },
    }
}

async fn proxy_once(
    client: &Client<HttpConnector, Full<Bytes>>,
    target_addr: &str,
    raw_request: &[u8],
) -> Result<Vec<u8>, ForwarderError> {
    let parsed = wire::parse_request(raw_request).map_err(|e| ForwarderError::Connect(e.to_string()))?;
    let (mut parts, body) = parsed.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| http::uri::PathAndQuery::from_static("/"));
    parts.uri = Uri::builder()
        .scheme("http")
        .authority(target_addr)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ForwarderError::Connect(e.to_string()))?;

    let outbound = http::Request::from_parts(parts, Full::new(body));

    let response = client
        .request(outbound)
        .await
        .map_err(|e| ForwarderError::Connect(e.to_string()))?;
    let (parts, body) = response.into_parts();
    let body_bytes = body
        .collect()
        .await
        .map_err(|e| ForwarderError::Connect(e.to_string()))?
        .to_bytes();

    Ok(wire::write_response(&http::Response::from_parts(parts, body_bytes)))
}

fn error_response(e: &ForwarderError) -> http::Response<Bytes> {
    http::Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(Bytes::from(e.to_string()))
        .expect("static response is always valid")
}
