//! Built-in echo service, used for connectivity checks and for exercising
//! timeouts, failures and deferral end to end.

use intellihouse_common::{RemoteError, Request, RpcRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::service::{Reply, RpcService, ServiceContext, ServiceResult};

/// Returns `payload` after `sleep_millis`, or fails with `fail_with`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub payload: String,
    #[serde(default)]
    pub sleep_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_with: Option<String>,
}

impl EchoRequest {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn sleeping(mut self, duration: Duration) -> Self {
        self.sleep_millis = duration.as_millis() as u64;
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }
}

impl RpcRequest for EchoRequest {
    const TYPE: &'static str = "Echo";
    type Response = EchoResponse;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub payload: String,
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct EchoError(pub String);

pub struct EchoService;

impl EchoService {
    fn echo(request: EchoRequest) -> ServiceResult<EchoResponse> {
        if request.sleep_millis > 0 {
            std::thread::sleep(Duration::from_millis(request.sleep_millis));
        }
        match request.fail_with {
            Some(message) => Err(RemoteError::from_error(&EchoError(message))),
            None => Ok(EchoResponse {
                payload: request.payload,
            }),
        }
    }
}

impl RpcService<EchoRequest> for EchoService {
    fn process(&self, request: Request<EchoRequest>, ctx: &ServiceContext) -> ServiceResult<Reply<EchoResponse>> {
        let body = request.body;
        if ctx.should_defer(Duration::from_millis(body.sleep_millis)) {
            return ctx.defer(move || Self::echo(body));
        }
        Self::echo(body).map(Reply::Payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_returns_payload() {
        let response = EchoService::echo(EchoRequest::new("hello")).unwrap();
        assert_eq!(response.payload, "hello");
    }

    #[test]
    fn test_echo_failure_keeps_message_and_type() {
        let error = EchoService::echo(EchoRequest::new("x").failing("relay stuck")).unwrap_err();
        assert_eq!(error.message, "relay stuck");
        assert!(error.remote_type.ends_with("EchoError"));
    }

    #[test]
    fn test_request_omits_defaults_on_wire() {
        let value = serde_json::to_value(EchoRequest::new("x")).unwrap();
        assert_eq!(value, serde_json::json!({ "payload": "x", "sleep_millis": 0 }));
    }
}
