//! Server side of a request: decode, dispatch, answer.

use intellihouse_common::{
    JsonCodec, RemoteError, RemoteErrorKind, RequestEnvelope, RequestId, Response, Result,
    ServerTransport,
};

use crate::context::RpcContext;
use crate::service::{Deferral, ServiceContext};

/// Executes requests against the services of its context.
///
/// Services run on the blocking pool; a panicking service is answered with
/// an error response of kind [`RemoteErrorKind::Panic`] instead of tearing
/// down the connection.
#[derive(Clone)]
pub struct RpcServer {
    context: RpcContext,
}

impl RpcServer {
    pub(crate) fn new(context: RpcContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &RpcContext {
        &self.context
    }

    /// Handles exactly one request arriving on `transport`.
    ///
    /// Undecodable requests are answered with an error response under the
    /// nil request id. Only failures of the transport itself are returned.
    pub async fn receive_and_process_request<T>(&self, transport: &mut T) -> Result<()>
    where
        T: ServerTransport + ?Sized,
    {
        let payload = transport.receive_request().await?;

        let response = match JsonCodec::decode_request(&payload) {
            Ok(envelope) => {
                transport.request_received(&envelope.header);
                self.process_request(envelope, Deferral::Allowed).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode request");
                Response::error(RequestId::nil(), RemoteError::from_rpc_error(&e))
            }
        };

        transport.send_response(JsonCodec::encode_response(&response)?).await
    }

    /// Dispatches a decoded request to its service and returns the response.
    pub async fn process_request(&self, envelope: RequestEnvelope, deferral: Deferral) -> Response {
        let channel_id = envelope.header.channel_id.clone();
        let Some(request_id) = envelope.header.request_id else {
            return Response::error(
                RequestId::nil(),
                RemoteError::invalid_request("Request without request id"),
            );
        };

        let request_type = envelope.request_type.clone();
        let Some(service) = self
            .context
            .services()
            .lookup(&request_type, channel_id.as_ref())
        else {
            tracing::warn!(request_type = %request_type, "No service registered");
            return Response::error(request_id, RemoteError::service_not_found(&request_type))
                .with_channel(channel_id);
        };

        tracing::debug!(%request_id, request_type = %request_type, "Processing request");
        let ctx = ServiceContext::new(self.context.clone(), envelope.header.clone(), deferral);
        match tokio::task::spawn_blocking(move || service.handle(envelope, &ctx)).await {
            Ok(response) => response,
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "Service task was cancelled".to_string()
                };
                tracing::error!(%request_id, request_type = %request_type, %message, "Service panicked");
                Response::error(
                    request_id,
                    RemoteError::new(RemoteErrorKind::Panic, request_type, message),
                )
                .with_channel(channel_id)
            }
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Service panicked".to_string()
    }
}
