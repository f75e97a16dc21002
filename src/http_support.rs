//! Small shared helpers for building hyper response bodies. Lifted from the
//! gateway's HTTP serving layer so the Proxier and front-door don't each
//! reinvent boxed-body plumbing.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

pub fn text_response(status: http::StatusCode, body: impl Into<Bytes>) -> hyper::Response<BoxBody> {
    hyper::Response::builder()
        .status(status)
        .body(full_body(body))
        .unwrap()
}
