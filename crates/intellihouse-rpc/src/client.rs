use hyper::body::Bytes;
use intellihouse_common::{
    ClientTransportProvider, HostId, JsonCodec, Request, RequestEnvelope, RequestHeader, Response,
    ResponseBody, Result, RpcError, RpcRequest,
};
use std::sync::Arc;
use tokio::time::Instant;

use crate::context::RpcContext;

/// Client for invoking remote services.
///
/// Opens a fresh transport from its provider for every request, so one
/// client may be shared by any number of concurrent invocations.
///
/// A call that the server answers with a deferring response keeps waiting
/// until the final response arrives through the inverse path or the
/// request's timeout expires.
#[derive(Clone)]
pub struct RpcClient {
    context: RpcContext,
    provider: Arc<dyn ClientTransportProvider>,
}

impl RpcClient {
    pub(crate) fn new(context: RpcContext, provider: Arc<dyn ClientTransportProvider>) -> Self {
        Self { context, provider }
    }

    /// Invokes `request` and returns its typed payload.
    ///
    /// Remote failures surface as [`RpcError::Remote`] carrying the remote
    /// message, or as [`RpcError::ServiceNotFound`] / [`RpcError::InvalidRequest`].
    pub async fn invoke<R: RpcRequest>(&self, request: Request<R>) -> Result<R::Response> {
        self.invoke_envelope(request.into_envelope()?)
            .await?
            .into_payload()
    }

    /// Invokes an untyped request and returns the final response.
    ///
    /// Assigns a request id when absent and stamps the local host as client.
    pub async fn invoke_envelope(&self, mut envelope: RequestEnvelope) -> Result<Response> {
        self.context.ensure_open()?;

        let request_id = *envelope
            .header
            .request_id
            .get_or_insert_with(intellihouse_common::RequestId::generate);
        envelope.header.client_host_id = Some(self.context.host_id().clone());

        let timeout = envelope
            .header
            .effective_timeout(self.context.config().default_timeout);
        let deadline = Instant::now() + timeout;
        let timeout_ms = timeout.as_millis() as u64;
        let payload = JsonCodec::encode_request(&envelope)?;

        // registered before sending so an early delivery finds its waiter
        let deferred = self.context.pending_deferred().register(request_id);
        let response = match self.exchange_with_retry(&envelope.header, payload, deadline).await {
            Ok(response) => response,
            Err(e) => {
                self.context.pending_deferred().cancel(&request_id);
                return Err(match e {
                    RpcError::Timeout(_) => RpcError::Timeout(timeout_ms),
                    other => other,
                });
            }
        };

        if response.request_id != request_id {
            self.context.pending_deferred().cancel(&request_id);
            // undecodable requests are answered under the nil id
            if let (true, ResponseBody::Error { error }) = (response.request_id.is_nil(), response.body) {
                return Err(error.into());
            }
            return Err(RpcError::InvalidResponse(format!(
                "Response id {} does not match request id {}",
                response.request_id, request_id
            )));
        }

        if !response.is_deferring() {
            self.context.pending_deferred().cancel(&request_id);
            return Ok(response);
        }

        tracing::debug!(%request_id, "Response deferred, waiting for delivery");
        match tokio::time::timeout_at(deadline, deferred).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => {
                self.context.pending_deferred().cancel(&request_id);
                Err(RpcError::Timeout(timeout_ms))
            }
        }
    }

    async fn exchange_with_retry(
        &self,
        header: &RequestHeader,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<Response> {
        match self.exchange(&header.server_host_id, payload.clone(), deadline).await {
            Err(e) if header.idempotent && e.is_transient() && Instant::now() < deadline => {
                tracing::warn!(server = %header.server_host_id, error = %e, "Retrying idempotent request");
                self.exchange(&header.server_host_id, payload, deadline).await
            }
            result => result,
        }
    }

    async fn exchange(&self, server: &HostId, payload: Bytes, deadline: Instant) -> Result<Response> {
        let timeout_ms = deadline
            .saturating_duration_since(Instant::now())
            .as_millis() as u64;
        let mut transport = self.provider.create_client_transport(server)?;

        let exchange = async {
            transport.send_request(payload).await?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            transport.receive_response(remaining).await
        };
        let result = match tokio::time::timeout_at(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout(timeout_ms)),
        };

        if let Err(e) = transport.close().await {
            tracing::debug!(error = %e, "Failed to close client transport");
        }
        JsonCodec::decode_response(&result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EchoRequest, RpcMode};

    #[tokio::test]
    async fn test_unknown_host() {
        let context = RpcContext::new(RpcMode::Client);
        let client = context.create_rpc_client();

        let result = client
            .invoke(Request::new(HostId::new("nowhere"), EchoRequest::new("x")))
            .await;
        assert!(matches!(result, Err(RpcError::UnknownHost(host)) if host.as_str() == "nowhere"));
        assert!(context.pending_deferred().is_empty());
    }

    #[tokio::test]
    async fn test_closed_context_rejects_invocations() {
        let context = RpcContext::new(RpcMode::Client);
        let client = context.create_rpc_client();
        context.close();

        let result = client
            .invoke(Request::new(HostId::new("coordinator"), EchoRequest::new("x")))
            .await;
        assert!(matches!(result, Err(RpcError::Closed)));
    }
}
