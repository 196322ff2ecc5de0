//! Integration tests for the protocol module
//!
//! These tests verify request/response construction, envelope conversion,
//! id generation, and the mapping between remote and local errors.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Dim {
        level: u8,
    }

    impl RpcRequest for Dim {
        const TYPE: &'static str = "Dim";
        type Response = u8;
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Other;

    impl RpcRequest for Other {
        const TYPE: &'static str = "Other";
        type Response = ();
    }

    #[test]
    fn test_request_creation() {
        let req = Request::new(HostId::new("pi-1"), Dim { level: 40 });
        assert_eq!(req.header.server_host_id, HostId::new("pi-1"));
        assert!(req.header.request_id.is_none());
        assert!(req.header.client_host_id.is_none());
        assert_eq!(req.header.timeout_ms, 0);
        assert!(!req.header.idempotent);
        assert!(req.header.channel_id.is_none());
    }

    #[test]
    fn test_request_builders() {
        let req = Request::new(HostId::new("pi-1"), Dim { level: 40 })
            .with_timeout(5000)
            .with_channel(ChannelId::new("dimmer-3"))
            .idempotent();
        assert_eq!(req.header.timeout_ms, 5000);
        assert_eq!(req.header.channel_id, Some(ChannelId::new("dimmer-3")));
        assert!(req.header.idempotent);
    }

    #[test]
    fn test_effective_timeout() {
        let header = RequestHeader::new(HostId::new("h"));
        assert_eq!(header.effective_timeout(Duration::from_secs(7)), Duration::from_secs(7));

        let mut header = header;
        header.timeout_ms = 250;
        assert_eq!(header.effective_timeout(Duration::from_secs(7)), Duration::from_millis(250));
    }

    #[test]
    fn test_envelope_carries_type_tag() {
        let envelope = Request::new(HostId::new("pi-1"), Dim { level: 40 })
            .into_envelope()
            .unwrap();
        assert_eq!(envelope.request_type, "Dim");
        assert_eq!(envelope.payload, json!({"level": 40}));

        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["type"], "Dim");
        assert_eq!(wire["header"]["server_host_id"], "pi-1");
    }

    #[test]
    fn test_from_envelope_rejects_other_type() {
        let envelope = Request::new(HostId::new("pi-1"), Other).into_envelope().unwrap();
        let result = Request::<Dim>::from_envelope(envelope);
        assert!(matches!(result, Err(RpcError::InvalidRequest(_))));
    }

    #[test]
    fn test_request_id_uniqueness() {
        let ids: HashSet<_> = (0..1000).map(|_| RequestId::generate()).collect();
        assert_eq!(ids.len(), 1000, "All request IDs should be unique");
        assert!(!RequestId::generate().is_nil());
        assert!(RequestId::nil().is_nil());
    }

    #[test]
    fn test_host_id_value_semantics() {
        let a = HostId::new("coordinator");
        let b: HostId = "coordinator".into();
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert!(!HostId::local().as_str().is_empty());
    }

    #[test]
    fn test_null_payload_is_void() {
        let id = RequestId::generate();
        let response = Response::with_payload(id, &()).unwrap();
        assert_eq!(response.body, ResponseBody::Void);
        response.into_payload::<()>().unwrap();
    }

    #[test]
    fn test_void_where_payload_expected_is_invalid() {
        let response = Response::void(RequestId::generate());
        assert!(matches!(
            response.into_payload::<String>(),
            Err(RpcError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_deferring_response_has_no_payload() {
        let response = Response::deferring(RequestId::generate());
        assert!(response.is_deferring());
        assert!(response.into_payload::<u8>().is_err());
    }

    #[test]
    fn test_error_response_becomes_remote_exception() {
        let error = RemoteError::application("RelayError", "relay stuck")
            .with_cause(RemoteError::application("std::io::Error", "bus timeout"));
        let response = Response::error(RequestId::generate(), error);

        let err = response.into_payload::<u8>().unwrap_err();
        assert_eq!(err.to_string(), "relay stuck");
        match err {
            RpcError::Remote(exception) => {
                assert_eq!(exception.remote_type, "RelayError");
                let cause = std::error::Error::source(&exception).unwrap();
                assert_eq!(cause.to_string(), "bus timeout");
            }
            other => panic!("expected remote exception, got {:?}", other),
        }
    }

    #[test]
    fn test_known_kinds_are_reconstructed() {
        let not_found: RpcError = RemoteError::service_not_found("Dim").into();
        assert!(matches!(not_found, RpcError::ServiceNotFound(ref msg) if msg.contains("Dim")));

        let invalid: RpcError = RemoteError::invalid_request("missing header").into();
        assert!(matches!(invalid, RpcError::InvalidRequest(_)));

        let panic: RpcError = RemoteError::new(RemoteErrorKind::Panic, "panic", "boom").into();
        assert!(matches!(panic, RpcError::Remote(_)));
    }

    #[test]
    fn test_from_error_walks_source_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer failure")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "inner failure"));
        let remote = RemoteError::from_error(&err);
        assert_eq!(remote.message, "outer failure");
        assert!(remote.remote_type.ends_with("Outer"));
        assert_eq!(remote.cause.unwrap().message, "inner failure");
    }

    #[test]
    fn test_rpc_error_to_remote_error_roundtrip() {
        let remote = RemoteError::from_rpc_error(&RpcError::ServiceNotFound("x".into()));
        assert_eq!(remote.kind, RemoteErrorKind::ServiceNotFound);

        let remote = RemoteError::from_rpc_error(&RpcError::Transport("down".into()));
        assert_eq!(remote.kind, RemoteErrorKind::Application);
        assert_eq!(remote.message, "Transport error: down");
    }

    #[test]
    fn test_transient_errors() {
        assert!(RpcError::Transport("reset".into()).is_transient());
        assert!(RpcError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).is_transient());
        assert!(!RpcError::Timeout(10).is_transient());
        assert!(!RpcError::ServiceNotFound("x".into()).is_transient());
    }

    #[test]
    fn test_poll_budget_is_ninety_percent() {
        assert_eq!(RpcConst::poll_budget(Duration::from_secs(60)), Duration::from_secs(54));
        assert_eq!(RpcConst::poll_budget(Duration::from_millis(1000)), Duration::from_millis(900));
    }
}
