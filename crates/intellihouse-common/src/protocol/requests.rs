//! Intellihouse Request Types
//!
//! A request is a typed body plus a routing/correlation header. On the wire
//! it travels as a [`RequestEnvelope`] whose `type` field names the concrete
//! request type, which is also the key servers dispatch on.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::error::{Result, RpcError};
use super::ids::{ChannelId, HostId, RequestId};

/// A concrete request type.
///
/// Every request type names itself on the wire through [`RpcRequest::TYPE`]
/// and declares the payload type of its successful response. Requests
/// answered without payload use `()`.
pub trait RpcRequest: Serialize + DeserializeOwned + Send + 'static {
    /// Wire tag of this request type; must be unique within a registry.
    const TYPE: &'static str;
    /// Payload of a successful response.
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

/// Routing and correlation data carried by every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Assigned by the client when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Stamped by the client from its owning context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_host_id: Option<HostId>,
    /// Routing target
    pub server_host_id: HostId,
    /// Client-side timeout in milliseconds, 0 selects the default
    #[serde(default)]
    pub timeout_ms: u64,
    /// Whether a transient failure may be retried
    #[serde(default)]
    pub idempotent: bool,
    /// Logical endpoint within the server host, for channel requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
}

impl RequestHeader {
    pub fn new(server_host_id: HostId) -> Self {
        RequestHeader {
            request_id: None,
            client_host_id: None,
            server_host_id,
            timeout_ms: 0,
            idempotent: false,
            channel_id: None,
        }
    }

    /// Returns the request's own timeout, or `default` when it has none.
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        if self.timeout_ms > 0 {
            Duration::from_millis(self.timeout_ms)
        } else {
            default
        }
    }
}

/// A typed request as built by callers.
///
/// # Example
///
/// ```
/// use intellihouse_common::{ChannelId, HostId, Request, RpcRequest};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct SwitchRelay { on: bool }
///
/// impl RpcRequest for SwitchRelay {
///     const TYPE: &'static str = "SwitchRelay";
///     type Response = ();
/// }
///
/// let request = Request::new(HostId::new("pi-garage"), SwitchRelay { on: true })
///     .with_channel(ChannelId::new("relay-1"))
///     .idempotent();
///
/// assert!(request.header.idempotent);
/// assert!(request.header.request_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Request<R> {
    pub header: RequestHeader,
    pub body: R,
}

impl<R: RpcRequest> Request<R> {
    pub fn new(server_host_id: HostId, body: R) -> Self {
        Request {
            header: RequestHeader::new(server_host_id),
            body,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.header.timeout_ms = timeout_ms;
        self
    }

    pub fn with_channel(mut self, channel_id: ChannelId) -> Self {
        self.header.channel_id = Some(channel_id);
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.header.request_id = Some(request_id);
        self
    }

    /// Marks the request as safe to retry on transient transport failures.
    pub fn idempotent(mut self) -> Self {
        self.header.idempotent = true;
        self
    }

    /// Converts the typed request into its wire envelope.
    pub fn into_envelope(self) -> Result<RequestEnvelope> {
        Ok(RequestEnvelope {
            header: self.header,
            request_type: R::TYPE.to_string(),
            payload: serde_json::to_value(self.body)?,
        })
    }

    /// Recovers a typed request from an envelope tagged with `R::TYPE`.
    pub fn from_envelope(envelope: RequestEnvelope) -> Result<Self> {
        if envelope.request_type != R::TYPE {
            return Err(RpcError::InvalidRequest(format!(
                "Expected request type '{}', got '{}'",
                R::TYPE,
                envelope.request_type
            )));
        }

        Ok(Request {
            header: envelope.header,
            body: serde_json::from_value(envelope.payload)?,
        })
    }
}

/// Wire form of a request: header, type tag and untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub header: RequestHeader,
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl RequestEnvelope {
    pub fn request_id(&self) -> Option<RequestId> {
        self.header.request_id
    }
}
