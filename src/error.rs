use std::fmt;

/// Errors raised while extracting or injecting peer/tenant identity on
/// stream metadata.
#[derive(Debug)]
pub enum IdentityError {
    NoPeerID,
    AmbiguousPeerID,
    NoTenantID,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::NoPeerID => write!(f, "no peer id"),
            IdentityError::AmbiguousPeerID => write!(f, "multiple peer ids present"),
            IdentityError::NoTenantID => write!(f, "no tenant id"),
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<IdentityError> for tonic::Status {
    fn from(e: IdentityError) -> Self {
        tonic::Status::invalid_argument(e.to_string())
    }
}

/// Raised when a routing lookup against the peer registry misses.
#[derive(Debug)]
pub struct NoSuchPeer(pub String);

impl fmt::Display for NoSuchPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no such peer: {}", self.0)
    }
}

impl std::error::Error for NoSuchPeer {}

/// Errors raised while proxying a single HTTP request over the tunnel.
/// Every variant maps to a `502 Bad Gateway` at the HTTP boundary; see
/// `proxier::Proxier::serve`.
#[derive(Debug)]
pub enum ProxyingError {
    RequestSerialize(String),
    ResponseParse(String),
    GatewayClosed,
}

impl fmt::Display for ProxyingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyingError::RequestSerialize(msg) => write!(f, "error writing request: {}", msg),
            ProxyingError::ResponseParse(msg) => write!(f, "error reading response: {}", msg),
            ProxyingError::GatewayClosed => write!(f, "gateway closed"),
        }
    }
}

impl std::error::Error for ProxyingError {}
