//! End-to-end coverage of the multiplexing core: a `Proxier` driven by a
//! real HTTP server on one side and a simulated peer draining its outbox on
//! the other. These exercise the scenarios the correlation table and
//! close/timeout invariants are built around, without requiring an actual
//! gRPC connection (the RPC plumbing itself is exercised by `tunnel_service`
//! being a thin adapter over `Proxier`, tested at the unit level).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rtun::proxier::Proxier;
use rtun::registry::PeerRegistry;
use rtun::wire;
use tokio::net::TcpListener;

async fn spawn_proxier_server(proxier: Arc<Proxier>, deadline: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(v) => v,
                Err(_) => return,
            };
            let proxier = proxier.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let svc = service_fn(move |req: Request<Incoming>| {
                    let proxier = proxier.clone();
                    async move { Ok::<_, hyper::Error>(proxier.serve(req, deadline).await) }
                });
                let _ = auto::Builder::new(TokioExecutor::new())
                    .http1()
                    .serve_connection(io, svc)
                    .await;
            });
        }
    });

    addr
}

fn http_client() -> Client<HttpConnector, Full<Bytes>> {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

async fn get(client: &Client<HttpConnector, Full<Bytes>>, uri: String) -> (u16, Bytes) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap();
    let resp = client.request(req).await.unwrap();
    let status = resp.status().as_u16();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

/// S1: a request reaches the peer and the peer's response comes back intact.
#[tokio::test]
async fn hello_world_round_trips_through_proxier() {
    let (proxier, mut outbox_rx) = Proxier::new(8);
    let proxier = Arc::new(proxier);

    let peer_proxier = proxier.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            let parsed = wire::parse_request(&frame.request).unwrap();
            assert_eq!(parsed.uri().path(), "/hello");
            let response = http::Response::builder()
                .status(200)
                .body(Bytes::from_static(b"hello, world"))
                .unwrap();
            peer_proxier.deliver_response(frame.id, wire::write_response(&response));
        }
    });

    let addr = spawn_proxier_server(proxier, Duration::from_secs(5)).await;
    let client = http_client();

    let (status, body) = get(&client, format!("http://{addr}/hello")).await;
    assert_eq!(status, 200);
    assert_eq!(body.as_ref(), b"hello, world");
}

/// S2: the registry lists peer ids sorted, scoped per tenant.
#[tokio::test]
async fn listing_peers_is_sorted_and_tenant_scoped() {
    let registry = PeerRegistry::new();
    for id in ["zebra", "alpha", "mango"] {
        let (p, _rx) = Proxier::new(4);
        registry.register("acme", id, Arc::new(p));
    }
    assert_eq!(registry.list("acme"), vec!["alpha", "mango", "zebra"]);
    assert!(registry.list("other-tenant").is_empty());
}

/// S3: a request for an unregistered peer id fails lookup before any I/O.
#[tokio::test]
async fn missing_peer_is_reported_without_touching_the_network() {
    let registry = PeerRegistry::new();
    let err = registry.lookup("none", "ghost").unwrap_err();
    assert_eq!(err.to_string(), "no such peer: ghost");
}

/// S4: a peer that never answers causes the caller to time out, and the
/// pending table is cleaned up (no leak).
#[tokio::test]
async fn unanswered_request_times_out_and_leaves_no_pending_entry() {
    let (proxier, _outbox_rx) = Proxier::new(8);
    // `_outbox_rx` is intentionally never drained: the request is sent but
    // nobody ever calls `deliver_response`.
    let proxier = Arc::new(proxier);

    let addr = spawn_proxier_server(proxier.clone(), Duration::from_millis(100)).await;
    let client = http_client();

    let (status, _) = get(&client, format!("http://{addr}/slow")).await;
    assert_eq!(status, 504);
    assert_eq!(proxier.pending_count(), 0);
}

/// S5: concurrent requests are each matched to their own response, never
/// cross-delivered, under load; the peer observes exactly the id set
/// {1, ..., 100}.
#[tokio::test]
async fn concurrent_requests_correlate_to_the_right_response() {
    use std::collections::HashSet;
    use std::sync::Mutex;

    let (proxier, mut outbox_rx) = Proxier::new(64);
    let proxier = Arc::new(proxier);

    let observed_ids: Arc<Mutex<HashSet<i64>>> = Arc::new(Mutex::new(HashSet::new()));

    let peer_proxier = proxier.clone();
    let peer_observed_ids = observed_ids.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            let peer_proxier = peer_proxier.clone();
            let peer_observed_ids = peer_observed_ids.clone();
            tokio::spawn(async move {
                peer_observed_ids.lock().unwrap().insert(frame.id);
                let parsed = wire::parse_request(&frame.request).unwrap();
                let echoed = parsed.uri().path().to_string();
                let response = http::Response::builder()
                    .status(200)
                    .body(Bytes::from(echoed))
                    .unwrap();
                peer_proxier.deliver_response(frame.id, wire::write_response(&response));
            });
        }
    });

    let addr = spawn_proxier_server(proxier, Duration::from_secs(5)).await;
    let client = http_client();

    let mut handles = Vec::new();
    for i in 0..100 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let path = format!("/item/{i}");
            let (status, body) = get(&client, format!("http://{addr}{path}")).await;
            assert_eq!(status, 200);
            assert_eq!(body, Bytes::from(path));
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let expected: HashSet<i64> = (1..=100).collect();
    assert_eq!(*observed_ids.lock().unwrap(), expected);
}

/// S6: closing the Proxier mid-flight resolves any waiting caller with a
/// prompt `502` rather than leaving them hanging until their own timeout.
#[tokio::test]
async fn closing_the_proxier_resolves_in_flight_requests() {
    let (proxier, mut outbox_rx) = Proxier::new(8);
    let proxier = Arc::new(proxier);

    let closer = proxier.clone();
    tokio::spawn(async move {
        // Wait for the request to actually be in flight, then close.
        let _frame = outbox_rx.recv().await;
        closer.close();
    });

    let addr = spawn_proxier_server(proxier.clone(), Duration::from_secs(30)).await;
    let client = http_client();

    let (status, _) = get(&client, format!("http://{addr}/will-be-closed")).await;
    assert_eq!(status, 502);
    assert_eq!(proxier.pending_count(), 0);
}
