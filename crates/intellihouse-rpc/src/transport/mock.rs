use async_trait::async_trait;
use hyper::body::Bytes;
use intellihouse_common::{
    ClientTransport, ClientTransportProvider, HostId, Result, RpcError, ServerTransport,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::context::RpcContext;
use crate::server::RpcServer;

/// Routes requests to in-process contexts keyed by host id.
///
/// Each request is processed by the target's [`RpcServer`] on a spawned
/// task, so a client that times out leaves the server-side work running
/// just like a real network peer would.
#[derive(Default)]
pub struct MockTransportProvider {
    targets: RwLock<HashMap<HostId, RpcContext>>,
    failing_sends: Arc<AtomicUsize>,
}

impl MockTransportProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(self, host_id: impl Into<HostId>, context: RpcContext) -> Self {
        self.add_target(host_id, context);
        self
    }

    pub fn add_target(&self, host_id: impl Into<HostId>, context: RpcContext) {
        self.targets.write().insert(host_id.into(), context);
    }

    /// Makes the next `count` sends fail with a transport error.
    pub fn fail_next_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }
}

impl ClientTransportProvider for MockTransportProvider {
    fn create_client_transport(&self, host_id: &HostId) -> Result<Box<dyn ClientTransport>> {
        let target = self
            .targets
            .read()
            .get(host_id)
            .cloned()
            .ok_or_else(|| RpcError::UnknownHost(host_id.clone()))?;

        Ok(Box::new(MockClientTransport {
            server: target.create_rpc_server(),
            failing_sends: self.failing_sends.clone(),
            in_flight: None,
        }))
    }
}

pub struct MockClientTransport {
    server: RpcServer,
    failing_sends: Arc<AtomicUsize>,
    in_flight: Option<JoinHandle<Result<Bytes>>>,
}

#[async_trait]
impl ClientTransport for MockClientTransport {
    async fn send_request(&mut self, payload: Bytes) -> Result<()> {
        let fail = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(RpcError::Transport("Simulated connection failure".to_string()));
        }

        let server = self.server.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let mut transport = MockServerTransport::new(payload);
            server.receive_and_process_request(&mut transport).await?;
            transport
                .take_response()
                .ok_or_else(|| RpcError::Transport("Server sent no response".to_string()))
        }));
        Ok(())
    }

    async fn receive_response(&mut self, timeout: Duration) -> Result<Bytes> {
        let in_flight = self
            .in_flight
            .take()
            .ok_or_else(|| RpcError::Transport("No request in flight".to_string()))?;

        match tokio::time::timeout(timeout, in_flight).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(RpcError::Transport(format!("Server task failed: {}", e))),
            Err(_) => Err(RpcError::Timeout(timeout.as_millis() as u64)),
        }
    }
}

/// Server end of a mock exchange: one request in, one response out.
pub struct MockServerTransport {
    request: Option<Bytes>,
    response: Option<Bytes>,
}

impl MockServerTransport {
    pub fn new(request: Bytes) -> Self {
        Self {
            request: Some(request),
            response: None,
        }
    }

    pub fn take_response(&mut self) -> Option<Bytes> {
        self.response.take()
    }
}

#[async_trait]
impl ServerTransport for MockServerTransport {
    async fn receive_request(&mut self) -> Result<Bytes> {
        self.request
            .take()
            .ok_or_else(|| RpcError::Transport("Request already consumed".to_string()))
    }

    async fn send_response(&mut self, payload: Bytes) -> Result<()> {
        self.response = Some(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EchoRequest, RpcMode};
    use intellihouse_common::{JsonCodec, Request, RequestId, ResponseBody};

    #[tokio::test]
    async fn test_server_transport_round_trip() {
        let context = RpcContext::builder(RpcMode::Server).host_id("coordinator").build();
        let id = RequestId::generate();
        let envelope = Request::new(HostId::new("coordinator"), EchoRequest::new("hi"))
            .with_request_id(id)
            .into_envelope()
            .unwrap();

        let mut transport = MockServerTransport::new(JsonCodec::encode_request(&envelope).unwrap());
        context
            .create_rpc_server()
            .receive_and_process_request(&mut transport)
            .await
            .unwrap();

        let response = JsonCodec::decode_response(&transport.take_response().unwrap()).unwrap();
        assert_eq!(response.request_id, id);
        assert!(matches!(response.body, ResponseBody::Payload { .. }));
    }

    #[tokio::test]
    async fn test_garbage_is_answered_under_nil_id() {
        let context = RpcContext::builder(RpcMode::Server).host_id("coordinator").build();
        let mut transport = MockServerTransport::new(Bytes::from_static(b"{not json"));

        context
            .create_rpc_server()
            .receive_and_process_request(&mut transport)
            .await
            .unwrap();

        let response = JsonCodec::decode_response(&transport.take_response().unwrap()).unwrap();
        assert!(response.request_id.is_nil());
        assert!(matches!(response.body, ResponseBody::Error { .. }));
    }

    #[tokio::test]
    async fn test_simulated_failures_run_out() {
        let provider = MockTransportProvider::new()
            .with_target("coordinator", RpcContext::new(RpcMode::Server));
        provider.fail_next_sends(1);

        let host = HostId::new("coordinator");
        let mut first = provider.create_client_transport(&host).unwrap();
        assert!(matches!(
            first.send_request(Bytes::new()).await,
            Err(RpcError::Transport(_))
        ));
        let mut second = provider.create_client_transport(&host).unwrap();
        assert!(second.send_request(Bytes::new()).await.is_ok());
    }
}
