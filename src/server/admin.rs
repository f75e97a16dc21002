use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

use super::GatewayState;
use crate::http_support::{text_response, BoxBody};

pub fn handle_admin(req: Request<Incoming>, state: GatewayState) -> Result<Response<BoxBody>, hyper::Error> {
    Ok(match req.uri().path() {
        "/health" | "/healthz" => text_response(StatusCode::OK, r#"{"status":"ok"}"#),

        "/ready" | "/readyz" => {
            let body = format!(r#"{{"status":"ready","peers_registered":{}}}"#, state.registry.total_peer_count());
            text_response(StatusCode::OK, body)
        }

        "/metrics" => {
            let mut resp = text_response(StatusCode::OK, state.metrics.render());
            resp.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8".parse().unwrap(),
            );
            resp
        }

        _ => text_response(StatusCode::NOT_FOUND, r#"{"error":"not found"}"#),
    })
}
