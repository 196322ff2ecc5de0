use std::fmt;
use thiserror::Error;

use super::ids::HostId;
use super::responses::{RemoteError, RemoteErrorKind};

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error(transparent)]
    Remote(#[from] RemoteException),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Unknown host: {0}")]
    UnknownHost(HostId),

    #[error("Payload integrity check failed")]
    Integrity,

    #[error("RPC context is closed")]
    Closed,
}

impl RpcError {
    /// Whether the failure happened below the application level.
    ///
    /// Only transient failures may be retried, and only for idempotent requests.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transport(_) | RpcError::Io(_))
    }
}

impl From<RemoteError> for RpcError {
    fn from(error: RemoteError) -> Self {
        match error.kind {
            RemoteErrorKind::ServiceNotFound => RpcError::ServiceNotFound(error.message),
            RemoteErrorKind::InvalidRequest => RpcError::InvalidRequest(error.message),
            RemoteErrorKind::Application | RemoteErrorKind::Panic => {
                RpcError::Remote(RemoteException::from(error))
            }
        }
    }
}

/// Local reconstruction of a failure that occurred during remote processing.
///
/// Displays the remote message unchanged; the remote type name and cause
/// chain stay available for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteException {
    pub kind: RemoteErrorKind,
    pub remote_type: String,
    pub message: String,
    pub cause: Option<Box<RemoteException>>,
}

impl RemoteException {
    pub fn to_remote_error(&self) -> RemoteError {
        RemoteError {
            kind: self.kind,
            remote_type: self.remote_type.clone(),
            message: self.message.clone(),
            cause: self.cause.as_ref().map(|cause| Box::new(cause.to_remote_error())),
        }
    }
}

impl From<RemoteError> for RemoteException {
    fn from(error: RemoteError) -> Self {
        RemoteException {
            kind: error.kind,
            remote_type: error.remote_type,
            message: error.message,
            cause: error.cause.map(|cause| Box::new(RemoteException::from(*cause))),
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
