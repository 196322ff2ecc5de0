//! Endpoint URL canonicalization.

use crate::protocol::constants::RpcConst;
use crate::protocol::error::{Result, RpcError};

/// Normalizes a host's base URL to its canonical RPC endpoint.
///
/// A bare base URL, a base URL with trailing slash and the full endpoint URL
/// all resolve to the same `<base>/intellihouse/RPC`.
///
/// # Example
///
/// ```
/// use intellihouse_common::canonical_endpoint;
///
/// let expected = "http://h:8080/intellihouse/RPC";
/// assert_eq!(canonical_endpoint("http://h:8080").unwrap(), expected);
/// assert_eq!(canonical_endpoint("http://h:8080/").unwrap(), expected);
/// assert_eq!(canonical_endpoint("http://h:8080/intellihouse/RPC").unwrap(), expected);
/// ```
pub fn canonical_endpoint(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(RpcError::InvalidRequest(format!(
            "Invalid endpoint '{}': must start with http:// or https://",
            base_url
        )));
    }

    let base = trimmed.trim_end_matches('/');
    let servlet_suffix = format!("/{}", RpcConst::SERVLET_PATH);
    if base.ends_with(&servlet_suffix) {
        return Ok(base.to_string());
    }

    Ok(format!("{}{}", base, servlet_suffix))
}
