//! Opaque-payload HTTP/1.x wire grammar: turning a parsed [`http`] request or
//! response into the exact bytes that travel inside a [`RequestFrame`] /
//! [`ResponseFrame`], and back again.
//!
//! The multiplexing core never inspects these bytes beyond the envelope id;
//! parsing here exists only so the gateway can read the peer's response
//! (step 5 of `Proxier::serve`) and the peer can read the gateway's request
//! (step 3a of `Forwarder`). Header-name/value validation is left to
//! `httparse`/`http`; this module only assembles and disassembles messages.
//!
//! [`RequestFrame`]: crate::rpc::tunnel::RequestFrame
//! [`ResponseFrame`]: crate::rpc::tunnel::ResponseFrame

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri};
use std::fmt;

/// Maximum number of headers `httparse` will parse per message. Plenty for
/// real HTTP traffic; messages with more are rejected rather than silently
/// truncated.
const MAX_HEADERS: usize = 128;

#[derive(Debug)]
pub struct WireError(String);

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for WireError {}

impl WireError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Parses a complete, opaque HTTP/1.x request (request-line + headers +
/// body) as produced by [`write_request_proxy_form`].
pub fn parse_request(bytes: &[u8]) -> Result<Request<Bytes>, WireError> {
    let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut header_buf);

    let status = parsed
        .parse(bytes)
        .map_err(|e| WireError::new(format!("malformed request: {e}")))?;
    let header_len = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Err(WireError::new("incomplete request")),
    };

    let method = Method::from_bytes(parsed.method.unwrap_or("GET").as_bytes())
        .map_err(|e| WireError::new(format!("invalid method: {e}")))?;
    let uri: Uri = parsed
        .path
        .unwrap_or("/")
        .parse()
        .map_err(|e| WireError::new(format!("invalid request target: {e}")))?;

    let mut builder = Request::builder().method(method).uri(uri);
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| WireError::new(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| WireError::new(format!("invalid header value: {e}")))?;
        builder = builder.header(name, value);
    }

    let body = Bytes::copy_from_slice(&bytes[header_len..]);
    builder
        .body(body)
        .map_err(|e| WireError::new(format!("invalid request: {e}")))
}

/// Serializes `req` in *proxy form*: an absolute-URI request target when the
/// request carries scheme+authority (or a `Host` header to build one from),
/// otherwise the origin-form path. This lets the receiving peer reconstruct
/// the original request without any side-channel.
pub fn write_request_proxy_form(req: &Request<Bytes>) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + req.body().len());

    let target = proxy_form_target(req);
    out.extend_from_slice(req.method().as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");

    for (name, value) in req.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(req.body());
    out
}

fn proxy_form_target(req: &Request<Bytes>) -> String {
    if let Some(scheme) = req.uri().scheme_str() {
        if let Some(authority) = req.uri().authority() {
            let path = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            return format!("{scheme}://{authority}{path}");
        }
    }

    if let Some(host) = req.headers().get(http::header::HOST).and_then(|v| v.to_str().ok()) {
        let path = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        return format!("http://{host}{path}");
    }

    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

/// Parses a complete, opaque HTTP/1.x response as produced by
/// [`write_response`].
pub fn parse_response(bytes: &[u8]) -> Result<Response<Bytes>, WireError> {
    let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut header_buf);

    let status = parsed
        .parse(bytes)
        .map_err(|e| WireError::new(format!("malformed response: {e}")))?;
    let header_len = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => return Err(WireError::new("incomplete response")),
    };

    let code = parsed.code.ok_or_else(|| WireError::new("missing status code"))?;
    let status_code =
        StatusCode::from_u16(code).map_err(|e| WireError::new(format!("invalid status code: {e}")))?;

    let mut builder = Response::builder().status(status_code);
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| WireError::new(format!("invalid header name: {e}")))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| WireError::new(format!("invalid header value: {e}")))?;
        builder = builder.header(name, value);
    }

    let body = Bytes::copy_from_slice(&bytes[header_len..]);
    builder
        .body(body)
        .map_err(|e| WireError::new(format!("invalid response: {e}")))
}

/// Serializes `resp` as a complete HTTP/1.x response message.
pub fn write_response(resp: &Response<Bytes>) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + resp.body().len());

    out.extend_from_slice(b"HTTP/1.1 ");
    out.extend_from_slice(resp.status().as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(resp.status().canonical_reason().unwrap_or("").as_bytes());
    out.extend_from_slice(b"\r\n");

    for (name, value) in resp.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(resp.body());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_with_absolute_form_target() {
        let req = Request::builder()
            .method("GET")
            .uri("http://example.com/hello?x=1")
            .header("host", "example.com")
            .body(Bytes::from_static(b"body-bytes"))
            .unwrap();

        let bytes = write_request_proxy_form(&req);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("GET http://example.com/hello?x=1 HTTP/1.1\r\n"));

        let parsed = parse_request(&bytes).unwrap();
        assert_eq!(parsed.method(), Method::GET);
        assert_eq!(parsed.uri().path(), "/hello");
        assert_eq!(parsed.body().as_ref(), b"body-bytes");
    }

    #[test]
    fn request_falls_back_to_host_header_for_origin_form() {
        let req = Request::builder()
            .method("POST")
            .uri("/submit")
            .header("host", "internal.local")
            .body(Bytes::from_static(b"{}"))
            .unwrap();

        let bytes = write_request_proxy_form(&req);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("POST http://internal.local/submit HTTP/1.1\r\n"));
    }

    #[test]
    fn response_round_trips_headers_verbatim() {
        let resp = Response::builder()
            .status(201)
            .header("x-custom", "value")
            .header("content-type", "text/plain")
            .body(Bytes::from_static(b"hello, world"))
            .unwrap();

        let bytes = write_response(&resp);
        let parsed = parse_response(&bytes).unwrap();
        assert_eq!(parsed.status(), StatusCode::CREATED);
        assert_eq!(parsed.headers().get("x-custom").unwrap(), "value");
        assert_eq!(parsed.body().as_ref(), b"hello, world");
    }
}
