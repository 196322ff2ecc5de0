//! Intellihouse Response Types
//!
//! A [`Response`] mirrors the id (and channel) of the request it answers and
//! carries exactly one of: a payload, "no payload", a wire-safe error, or a
//! deferral notice.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;

use super::error::{Result, RpcError};
use super::ids::{ChannelId, RequestId};

/// Closed set of failure kinds that cross the wire.
///
/// Clients rebuild a matching local error only for the kinds they know;
/// everything else surfaces as a generic remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The service itself failed
    Application,
    /// The server had no handler for the request type
    ServiceNotFound,
    /// The request could not be decoded or was incomplete
    InvalidRequest,
    /// The service panicked while processing
    Panic,
}

/// Wire-safe description of a failure raised while processing a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    /// Name of the failing error type on the remote side
    pub remote_type: String,
    pub message: String,
    /// Best-effort cause chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<RemoteError>>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, remote_type: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            remote_type: remote_type.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn application(remote_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Application, remote_type, message)
    }

    pub fn service_not_found(request_type: &str) -> Self {
        Self::new(
            RemoteErrorKind::ServiceNotFound,
            "ServiceNotFound",
            format!("No service registered for request type '{}'", request_type),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::InvalidRequest, "InvalidRequest", message)
    }

    pub fn with_cause(mut self, cause: RemoteError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Captures a concrete error, its type name and its `source()` chain.
    ///
    /// # Example
    ///
    /// ```
    /// use intellihouse_common::RemoteError;
    ///
    /// let io = std::io::Error::new(std::io::ErrorKind::Other, "relay stuck");
    /// let remote = RemoteError::from_error(&io);
    /// assert_eq!(remote.message, "relay stuck");
    /// assert!(remote.remote_type.ends_with("Error"));
    /// ```
    pub fn from_error<E: StdError + 'static>(err: &E) -> Self {
        let mut remote = Self::application(std::any::type_name::<E>(), err.to_string());
        remote.cause = err.source().map(|source| Box::new(Self::from_source(source)));
        remote
    }

    fn from_source(err: &(dyn StdError + 'static)) -> Self {
        let mut remote = Self::application("dyn std::error::Error", err.to_string());
        remote.cause = err.source().map(|source| Box::new(Self::from_source(source)));
        remote
    }

    /// Converts a local runtime error into its wire form.
    pub fn from_rpc_error(err: &RpcError) -> Self {
        match err {
            RpcError::ServiceNotFound(message) => {
                Self::new(RemoteErrorKind::ServiceNotFound, "ServiceNotFound", message.clone())
            }
            RpcError::InvalidRequest(message) => Self::invalid_request(message.clone()),
            RpcError::JsonSerialization(e) => Self::invalid_request(e.to_string()),
            RpcError::Remote(exception) => exception.to_remote_error(),
            other => Self::from_error(other),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.remote_type, self.message)
    }
}

/// Outcome carried by a [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Successful completion with a payload
    Payload { value: Value },
    /// Successful completion without payload
    Void,
    /// Processing failed
    Error { error: RemoteError },
    /// Accepted; the real response follows through the inverse-request path
    Deferring,
}

/// An RPC response.
///
/// # Example
///
/// ```
/// use intellihouse_common::{RequestId, Response};
/// use serde_json::json;
///
/// let id = RequestId::generate();
/// let response = Response::success(id, json!({"payload": "x"}));
/// assert_eq!(response.request_id, id);
/// assert!(!response.is_deferring());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this response answers
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    pub body: ResponseBody,
}

impl Response {
    pub fn success(request_id: RequestId, value: Value) -> Self {
        if value.is_null() {
            return Self::void(request_id);
        }

        Response {
            request_id,
            channel_id: None,
            body: ResponseBody::Payload { value },
        }
    }

    /// Serializes a typed payload; unit payloads become void responses.
    pub fn with_payload<T: Serialize>(request_id: RequestId, payload: &T) -> Result<Self> {
        Ok(Self::success(request_id, serde_json::to_value(payload)?))
    }

    pub fn void(request_id: RequestId) -> Self {
        Response {
            request_id,
            channel_id: None,
            body: ResponseBody::Void,
        }
    }

    pub fn error(request_id: RequestId, error: RemoteError) -> Self {
        Response {
            request_id,
            channel_id: None,
            body: ResponseBody::Error { error },
        }
    }

    pub fn deferring(request_id: RequestId) -> Self {
        Response {
            request_id,
            channel_id: None,
            body: ResponseBody::Deferring,
        }
    }

    pub fn with_channel(mut self, channel_id: Option<ChannelId>) -> Self {
        self.channel_id = channel_id;
        self
    }

    pub fn is_deferring(&self) -> bool {
        matches!(self.body, ResponseBody::Deferring)
    }

    /// Resolves the response into its typed payload or the matching error.
    pub fn into_payload<T: DeserializeOwned>(self) -> Result<T> {
        match self.body {
            ResponseBody::Payload { value } => Ok(serde_json::from_value(value)?),
            ResponseBody::Void => serde_json::from_value(Value::Null).map_err(|_| {
                RpcError::InvalidResponse("Void response where a payload was expected".to_string())
            }),
            ResponseBody::Error { error } => Err(error.into()),
            ResponseBody::Deferring => Err(RpcError::InvalidResponse(
                "Deferring response carries no payload".to_string(),
            )),
        }
    }
}
