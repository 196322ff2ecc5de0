use hyper::body::Bytes;

use crate::protocol::error::Result;
use crate::protocol::{RequestEnvelope, Response};

/// JSON codec for encoding/decoding RPC messages
///
/// Requests travel as [`RequestEnvelope`]s so the receiving side can read the
/// `type` tag before it knows the concrete request type.
///
/// # Example
///
/// ```
/// use intellihouse_common::transport::JsonCodec;
/// use intellihouse_common::{RequestId, Response};
/// use serde_json::json;
///
/// let response = Response::success(RequestId::generate(), json!({"result": "ok"}));
/// let encoded = JsonCodec::encode_response(&response).unwrap();
/// let decoded = JsonCodec::decode_response(&encoded).unwrap();
/// assert_eq!(response, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a request envelope to bytes
    pub fn encode_request(request: &RequestEnvelope) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(request)?))
    }

    /// Decode a request envelope from bytes
    pub fn decode_request(data: &[u8]) -> Result<RequestEnvelope> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Encode a response to bytes
    pub fn encode_response(response: &Response) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(response)?))
    }

    /// Decode a response from bytes
    pub fn decode_response(data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}
