use async_trait::async_trait;
use hyper::body::Bytes;
use intellihouse_common::{
    ClientTransport, ClientTransportProvider, HostId, JsonCodec, RequestId, Response, Result,
    RpcError,
};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::context::RpcContext;

/// Transports that queue requests for a polling host instead of connecting to it.
///
/// Backs [`RpcContext::create_inverse_rpc_client`].
pub struct InverseTransportProvider {
    context: RpcContext,
}

impl InverseTransportProvider {
    pub fn new(context: RpcContext) -> Self {
        Self { context }
    }
}

impl ClientTransportProvider for InverseTransportProvider {
    fn create_client_transport(&self, host_id: &HostId) -> Result<Box<dyn ClientTransport>> {
        Ok(Box::new(InverseClientTransport {
            context: self.context.clone(),
            target: host_id.clone(),
            request_id: None,
            waiting: None,
        }))
    }
}

/// One inverse exchange: enqueue the request, wait for the matching put.
pub struct InverseClientTransport {
    context: RpcContext,
    target: HostId,
    request_id: Option<RequestId>,
    waiting: Option<oneshot::Receiver<Response>>,
}

#[async_trait]
impl ClientTransport for InverseClientTransport {
    async fn send_request(&mut self, payload: Bytes) -> Result<()> {
        let envelope = JsonCodec::decode_request(&payload)?;
        let request_id = envelope
            .request_id()
            .ok_or_else(|| RpcError::InvalidRequest("Inverse request without request id".into()))?;

        let rx = self.context.pending_inverse().register(request_id);
        self.context.inverse_requests().enqueue(&self.target, envelope);
        self.request_id = Some(request_id);
        self.waiting = Some(rx);
        Ok(())
    }

    async fn receive_response(&mut self, timeout: Duration) -> Result<Bytes> {
        let rx = self
            .waiting
            .take()
            .ok_or_else(|| RpcError::Transport("No inverse request in flight".into()))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => JsonCodec::encode_response(&response),
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => Err(RpcError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Forgets the waiter; a response put after this is dropped.
    async fn close(&mut self) -> Result<()> {
        if let Some(request_id) = self.request_id.take() {
            self.context.pending_inverse().cancel(&request_id);
        }
        Ok(())
    }
}
