//! The HTTP front-door (§4.5): the public surface that turns an inbound
//! HTTP request into a call on the right peer's [`Proxier`].
//!
//! Two routes:
//!   `GET /peers`           — list registered peer ids for the caller's tenant
//!   `ANY /peer/{id}/...`   — proxy the remaining path to that peer

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

use super::GatewayState;
use crate::http_support::{text_response, BoxBody};

const PEER_PATH_PREFIX: &str = "/peer/";

pub async fn handle_request(
    req: Request<Incoming>,
    state: GatewayState,
    _peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let tenant = match state.tenancy.extract_from_request_context(req.headers()) {
        Ok(t) => t,
        Err(e) => return Ok(text_response(StatusCode::BAD_REQUEST, e.to_string())),
    };

    if req.uri().path() == "/peers" {
        return Ok(list_peers(&state, &tenant));
    }

    let Some(rest) = req.uri().path().strip_prefix(PEER_PATH_PREFIX) else {
        return Ok(text_response(StatusCode::NOT_FOUND, "not found"));
    };
    let (peer_id, remainder) = rest.split_once('/').unwrap_or((rest, ""));
    if peer_id.is_empty() {
        return Ok(text_response(StatusCode::BAD_REQUEST, "missing peer id"));
    }
    let peer_id = peer_id.to_string();
    let downstream_path = format!("/{remainder}");

    let proxier = match state.registry.lookup(&tenant, &peer_id) {
        Ok(p) => p,
        Err(e) => {
            metrics::counter!("tunnel_http_requests_no_such_peer_total").increment(1);
            return Ok(text_response(StatusCode::BAD_GATEWAY, e.to_string()));
        }
    };

    let req = rewrite_path(req, &downstream_path);

    let deadline = Duration::from_secs(state.config.tunnel.response_timeout_secs);
    let started = Instant::now();
    let response = proxier.serve(req, deadline).await;

    metrics::counter!("tunnel_http_requests_total").increment(1);
    metrics::histogram!("tunnel_http_request_duration_seconds").record(started.elapsed().as_secs_f64());
    if response.status() == StatusCode::GATEWAY_TIMEOUT {
        metrics::counter!("tunnel_http_requests_timed_out_total").increment(1);
    } else if response.status() == StatusCode::BAD_GATEWAY {
        metrics::counter!("tunnel_http_requests_gateway_closed_total").increment(1);
    }

    Ok(response)
}

/// Rewrites a request's URI to drop the `/peer/{id}` routing prefix, so the
/// peer's local handler sees the path it would see with no tunnel in front
/// of it. The query string, if any, is preserved.
fn rewrite_path(req: Request<Incoming>, new_path: &str) -> Request<Incoming> {
    let (mut parts, body) = req.into_parts();
    let query = parts.uri.query().map(|q| q.to_string());
    let path_and_query = match query {
        Some(q) => format!("{new_path}?{q}"),
        None => new_path.to_string(),
    };
    let mut uri_parts = parts.uri.into_parts();
    uri_parts.path_and_query = Some(path_and_query.parse().expect("rebuilt path is always valid"));
    parts.uri = hyper::Uri::from_parts(uri_parts).expect("rebuilt uri is always valid");
    Request::from_parts(parts, body)
}

fn list_peers(state: &GatewayState, tenant: &str) -> Response<BoxBody> {
    let ids = state.registry.list(tenant);
    let body = serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string());
    let mut resp = text_response(StatusCode::OK, body);
    resp.headers_mut()
        .insert(hyper::header::CONTENT_TYPE, "application/json".parse().unwrap());
    resp
}
