//! Peer and tenant identity extraction/injection on stream metadata.
//!
//! This module is deliberately narrow: it knows how to read and write two
//! named fields on gRPC metadata (peer id, tenant id) and nothing else.
//! Tenant extraction itself is delegated to a [`TenancyExtractor`]
//! implementation so that the registry and RPC layer never hard-code a
//! multi-tenancy policy.

use tonic::metadata::{MetadataMap, MetadataValue};

use crate::error::IdentityError;

/// Metadata key carrying the peer identifier. Always required on `Register`.
pub const PEER_ID_METADATA_KEY: &str = "x-scope-proxyid";

/// Tenant identifier used everywhere multi-tenancy is disabled.
pub const DEFAULT_TENANT: &str = "none";

/// Reads the peer identifier from inbound stream metadata.
///
/// Fails with [`IdentityError::NoPeerID`] if the key is missing and
/// [`IdentityError::AmbiguousPeerID`] if it is present more than once.
pub fn extract_peer_id(metadata: &MetadataMap) -> Result<String, IdentityError> {
    let mut values = metadata.get_all(PEER_ID_METADATA_KEY).iter();
    let first = values.next().ok_or(IdentityError::NoPeerID)?;
    if values.next().is_some() {
        return Err(IdentityError::AmbiguousPeerID);
    }
    first
        .to_str()
        .map(str::to_owned)
        .map_err(|_| IdentityError::AmbiguousPeerID)
}

/// Writes the peer identifier into outbound stream metadata.
///
/// `metadata` is modified in place; callers that must not mutate a shared
/// metadata map should clone it first (gRPC outgoing metadata is owned per
/// request, so this is usually a non-issue on the peer side).
pub fn inject_peer_id(metadata: &mut MetadataMap, peer_id: &str) -> Result<(), IdentityError> {
    let value = MetadataValue::try_from(peer_id).map_err(|_| IdentityError::AmbiguousPeerID)?;
    metadata.insert(PEER_ID_METADATA_KEY, value);
    Ok(())
}

/// Resolves a tenant identifier from either gRPC stream metadata (peer
/// registration) or an HTTP request's headers (front-door routing).
///
/// The core never assumes a concrete header name or failure mode for the
/// HTTP side — those are collaborator concerns (§4.1, §9 open questions) —
/// but it does need *some* implementation to run end to end, so this module
/// provides the two policies the spec names explicitly.
pub trait TenancyExtractor: Send + Sync {
    fn extract_from_stream_metadata(&self, metadata: &MetadataMap) -> Result<String, IdentityError>;
    fn extract_from_request_context(&self, headers: &http::HeaderMap) -> Result<String, IdentityError>;
}

/// Multi-tenancy disabled: every peer and every request belongs to the
/// fixed sentinel tenant `"none"`.
pub struct NoTenancy;

impl TenancyExtractor for NoTenancy {
    fn extract_from_stream_metadata(&self, _metadata: &MetadataMap) -> Result<String, IdentityError> {
        Ok(DEFAULT_TENANT.to_string())
    }

    fn extract_from_request_context(&self, _headers: &http::HeaderMap) -> Result<String, IdentityError> {
        Ok(DEFAULT_TENANT.to_string())
    }
}

/// Multi-tenancy enabled: the tenant id is read from a single named header,
/// present on both gRPC metadata and plain HTTP headers.
pub struct HeaderTenancy {
    header_name: String,
}

impl HeaderTenancy {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }
}

impl TenancyExtractor for HeaderTenancy {
    fn extract_from_stream_metadata(&self, metadata: &MetadataMap) -> Result<String, IdentityError> {
        let mut values = metadata.get_all(self.header_name.as_str()).iter();
        let first = values.next().ok_or(IdentityError::NoTenantID)?;
        if values.next().is_some() {
            return Err(IdentityError::NoTenantID);
        }
        first
            .to_str()
            .map(str::to_owned)
            .map_err(|_| IdentityError::NoTenantID)
    }

    fn extract_from_request_context(&self, headers: &http::HeaderMap) -> Result<String, IdentityError> {
        let mut values = headers.get_all(self.header_name.as_str()).iter();
        let first = values.next().ok_or(IdentityError::NoTenantID)?;
        if values.next().is_some() {
            return Err(IdentityError::NoTenantID);
        }
        first
            .to_str()
            .map(str::to_owned)
            .map_err(|_| IdentityError::NoTenantID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_peer_id_is_an_error() {
        let md = MetadataMap::new();
        assert!(matches!(extract_peer_id(&md), Err(IdentityError::NoPeerID)));
    }

    #[test]
    fn single_peer_id_extracts_cleanly() {
        let mut md = MetadataMap::new();
        md.insert(PEER_ID_METADATA_KEY, MetadataValue::try_from("test-id").unwrap());
        assert_eq!(extract_peer_id(&md).unwrap(), "test-id");
    }

    #[test]
    fn duplicate_peer_ids_are_ambiguous() {
        let mut md = MetadataMap::new();
        md.append(PEER_ID_METADATA_KEY, MetadataValue::try_from("a").unwrap());
        md.append(PEER_ID_METADATA_KEY, MetadataValue::try_from("b").unwrap());
        assert!(matches!(extract_peer_id(&md), Err(IdentityError::AmbiguousPeerID)));
    }

    #[test]
    fn inject_then_extract_round_trips() {
        let mut md = MetadataMap::new();
        inject_peer_id(&mut md, "peer-42").unwrap();
        assert_eq!(extract_peer_id(&md).unwrap(), "peer-42");
    }

    #[test]
    fn no_tenancy_always_returns_sentinel() {
        let t = NoTenancy;
        assert_eq!(t.extract_from_stream_metadata(&MetadataMap::new()).unwrap(), DEFAULT_TENANT);
        assert_eq!(t.extract_from_request_context(&http::HeaderMap::new()).unwrap(), DEFAULT_TENANT);
    }

    #[test]
    fn header_tenancy_reads_named_header() {
        let t = HeaderTenancy::new("x-scope-orgid");
        let mut headers = http::HeaderMap::new();
        headers.insert("x-scope-orgid", http::HeaderValue::from_static("acme"));
        assert_eq!(t.extract_from_request_context(&headers).unwrap(), "acme");
    }
}
