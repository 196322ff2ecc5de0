//! Tests for endpoint canonicalization

use super::canonical_endpoint;
use crate::RpcError;

#[test]
fn test_bare_host_and_trailing_slash_match() {
    let bare = canonical_endpoint("http://h:8080").unwrap();
    let slash = canonical_endpoint("http://h:8080/").unwrap();
    let full = canonical_endpoint("http://h:8080/intellihouse/RPC").unwrap();

    assert_eq!(bare, "http://h:8080/intellihouse/RPC");
    assert_eq!(bare, slash);
    assert_eq!(bare, full);
}

#[test]
fn test_full_endpoint_with_trailing_slash() {
    assert_eq!(
        canonical_endpoint("http://h:8080/intellihouse/RPC/").unwrap(),
        "http://h:8080/intellihouse/RPC"
    );
}

#[test]
fn test_context_path_is_kept() {
    assert_eq!(
        canonical_endpoint("https://example.com/house/").unwrap(),
        "https://example.com/house/intellihouse/RPC"
    );
}

#[test]
fn test_missing_scheme_is_rejected() {
    let result = canonical_endpoint("127.0.0.1:8080");
    assert!(matches!(result, Err(RpcError::InvalidRequest(_))));
}
