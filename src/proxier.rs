//! The gateway-side Proxier (§4.3): an HTTP handler that serializes an
//! incoming request onto the tunnel, assigns it a monotonic id, and awaits
//! the matching response.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use tokio::sync::{mpsc, oneshot};

use crate::error::ProxyingError;
use crate::http_support::{text_response, BoxBody};
use crate::rpc::tunnel::RequestFrame;
use crate::wire;

/// How long `serve` waits for a response before giving up with a `504`.
/// The core has no notion of per-request deadlines of its own (§9); the
/// front-door supplies one as a stand-in for upstream HTTP client-context
/// cancellation, which hyper's server side does not expose directly.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

enum State {
    Open(mpsc::Sender<RequestFrame>),
    Closed,
}

/// One Proxier per registered peer. Created on registration, destroyed when
/// the peer's stream ends.
pub struct Proxier {
    next_id: AtomicI64,
    pending: DashMap<i64, oneshot::Sender<Bytes>>,
    state: RwLock<State>,
}

impl Proxier {
    /// Creates a Proxier with a bounded outbox of `outbox_capacity` and
    /// returns the receiving half that the RPC layer wraps into the
    /// `Register` response stream.
    pub fn new(outbox_capacity: usize) -> (Self, mpsc::Receiver<RequestFrame>) {
        let (tx, rx) = mpsc::channel(outbox_capacity);
        (
            Self {
                next_id: AtomicI64::new(0),
                pending: DashMap::new(),
                state: RwLock::new(State::Open(tx)),
            },
            rx,
        )
    }

    /// `true` while the underlying stream is live.
    pub fn is_open(&self) -> bool {
        matches!(*self.state.read().unwrap(), State::Open(_))
    }

    /// Number of requests with no response yet. Exposed for tests verifying
    /// invariant 5 (no leaks).
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Serves one HTTP request by round-tripping it through the tunnel.
    /// See §4.3 for the full algorithm; `deadline` stands in for the
    /// caller's request-context cancellation (see [`DEFAULT_RESPONSE_TIMEOUT`]).
    pub async fn serve(&self, req: Request<Incoming>, deadline: Duration) -> Response<BoxBody> {
        let sender = {
            let state = self.state.read().unwrap();
            match &*state {
                State::Open(tx) => tx.clone(),
                State::Closed => {
                    return text_response(StatusCode::BAD_GATEWAY, ProxyingError::GatewayClosed.to_string())
                }
            }
        };

        let (parts, body) = req.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return text_response(
                    StatusCode::BAD_GATEWAY,
                    ProxyingError::RequestSerialize(e.to_string()).to_string(),
                )
            }
        };
        let http_req = Request::from_parts(parts, body_bytes);
        let raw_request = wire::write_request_proxy_form(&http_req);

        // id assigned, then pending slot registered *before* enqueue (invariant 1).
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (resp_tx, resp_rx) = oneshot::channel::<Bytes>();
        self.pending.insert(id, resp_tx);
        metrics::gauge!("tunnel_proxier_pending_requests").increment(1.0);

        if sender
            .send(RequestFrame {
                id,
                request: raw_request,
            })
            .await
            .is_err()
        {
            if self.pending.remove(&id).is_some() {
                metrics::gauge!("tunnel_proxier_pending_requests").decrement(1.0);
            }
            return text_response(StatusCode::BAD_GATEWAY, ProxyingError::GatewayClosed.to_string());
        }

        let result = tokio::select! {
            biased;
            resolved = resp_rx => {
                // Always clear the pending entry on the way out (§4.3 step 5):
                // harmless no-op if `deliver_response` already removed it.
                if self.pending.remove(&id).is_some() {
                    metrics::gauge!("tunnel_proxier_pending_requests").decrement(1.0);
                }
                resolved
            }
            _ = tokio::time::sleep(deadline) => {
                if self.pending.remove(&id).is_some() {
                    metrics::gauge!("tunnel_proxier_pending_requests").decrement(1.0);
                }
                return text_response(StatusCode::GATEWAY_TIMEOUT, "timed out waiting for peer");
            }
        };

        match result {
            Ok(raw_response) => match wire::parse_response(&raw_response) {
                Ok(parsed) => build_downstream_response(parsed),
                Err(e) => text_response(
                    StatusCode::BAD_GATEWAY,
                    ProxyingError::ResponseParse(e.to_string()).to_string(),
                ),
            },
            // Sender dropped without sending: either `close()` drained us, or
            // the peer's Forwarder exited without a matching response.
            Err(_) => text_response(StatusCode::BAD_GATEWAY, ProxyingError::GatewayClosed.to_string()),
        }
    }

    /// Routes a Response frame back to its waiting caller (§4.3 "Response
    /// routing"). Unknown or already-resolved ids are dropped silently —
    /// this must never panic on late arrivals (invariant 2).
    pub fn deliver_response(&self, id: i64, response: Vec<u8>) {
        if let Some((_, tx)) = self.pending.remove(&id) {
            metrics::gauge!("tunnel_proxier_pending_requests").decrement(1.0);
            // Ignore send errors: the waiter already gave up (timeout).
            let _ = tx.send(Bytes::from(response));
        } else {
            tracing::warn!("proxier: dropping response for unknown or expired request, id={}", id);
        }
    }

    /// Flips state to CLOSED exactly once and closes the outbox. Concurrent
    /// `serve` calls observe either OPEN (and proceed) or CLOSED (and
    /// fast-fail). Draining pending slots here means callers racing the
    /// close see a prompt `502` instead of waiting out their own timeout
    /// (§4.3 "Close", §8 S6 — either resolution is acceptable).
    pub fn close(&self) {
        {
            let mut state = self.state.write().unwrap();
            *state = State::Closed;
        }
        let drained = self.pending.len();
        self.pending.clear();
        if drained > 0 {
            metrics::gauge!("tunnel_proxier_pending_requests").decrement(drained as f64);
        }
    }
}

fn build_downstream_response(parsed: Response<Bytes>) -> Response<BoxBody> {
    let (parts, body) = parsed.into_parts();
    Response::from_parts(parts, http_body_util::Full::new(body).map_err(|never| match never {}).boxed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::tunnel::ResponseFrame;
    use bytes::Bytes as B;

    // hyper::body::Incoming can only be produced by a live connection, so
    // `serve()` itself is exercised end-to-end in `tests/` instead; these
    // cases drive the pending table and state machine directly.

    #[tokio::test]
    async fn ids_start_at_one_and_increase_monotonically() {
        let (proxier, _rx) = Proxier::new(8);
        let first = proxier.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let second = proxier.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let third = proxier.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!((first, second, third), (1, 2, 3));
    }

    #[tokio::test]
    async fn deliver_response_to_unknown_id_does_not_panic() {
        let (proxier, _rx) = Proxier::new(8);
        proxier.deliver_response(999, b"ignored".to_vec());
        assert_eq!(proxier.pending_count(), 0);
    }

    #[tokio::test]
    async fn pending_table_drains_on_close() {
        let (proxier, _rx) = Proxier::new(8);
        let (tx, _rx2) = oneshot::channel::<Bytes>();
        proxier.pending.insert(1, tx);
        assert_eq!(proxier.pending_count(), 1);
        proxier.close();
        assert_eq!(proxier.pending_count(), 0);
        assert!(!proxier.is_open());
    }

    #[tokio::test]
    async fn deliver_response_resolves_matching_waiter() {
        let (proxier, _rx) = Proxier::new(8);
        let (tx, rx) = oneshot::channel::<Bytes>();
        proxier.pending.insert(7, tx);
        proxier.deliver_response(7, b"payload".to_vec());
        let got = rx.await.unwrap();
        assert_eq!(got, B::from_static(b"payload"));
        assert_eq!(proxier.pending_count(), 0);
    }

    #[tokio::test]
    async fn closed_proxier_rejects_new_serve_calls_without_touching_pending() {
        let (proxier, _rx) = Proxier::new(8);
        proxier.close();
        assert!(!proxier.is_open());
        // deliver_response after close: no pending entries to find, no panic.
        proxier.deliver_response(1, b"late".to_vec());
    }

    #[test]
    fn response_frame_round_trips_through_deliver() {
        // Sanity check that ResponseFrame's fields line up with
        // `deliver_response`'s (id, bytes) signature.
        let frame = ResponseFrame {
            id: 42,
            response: b"hi".to_vec(),
        };
        assert_eq!(frame.id, 42);
        assert_eq!(frame.response, b"hi");
    }
}
