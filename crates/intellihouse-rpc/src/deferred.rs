//! Deferred responses.
//!
//! A service expecting to outlast the transport timeout answers with a
//! deferring response right away (see [`ServiceContext::defer`]). Once the
//! work completes, the server queues a [`DeliverDeferredResponseRequest`]
//! for the calling host; that host's inverse poller executes it, and
//! [`DeliverDeferredResponseService`] wakes the invocation still waiting in
//! [`RpcClient::invoke`](crate::RpcClient::invoke).
//!
//! [`ServiceContext::defer`]: crate::ServiceContext::defer

use intellihouse_common::{Request, Response, RpcRequest};
use serde::{Deserialize, Serialize};

use crate::service::{Reply, RpcService, ServiceContext, ServiceResult};

/// Carries the final response of a deferred request back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverDeferredResponseRequest {
    pub response: Response,
}

impl RpcRequest for DeliverDeferredResponseRequest {
    const TYPE: &'static str = "DeliverDeferredResponse";
    type Response = ();
}

/// Completes the local invocation waiting for a deferred response.
pub struct DeliverDeferredResponseService;

impl RpcService<DeliverDeferredResponseRequest> for DeliverDeferredResponseService {
    fn process(
        &self,
        request: Request<DeliverDeferredResponseRequest>,
        ctx: &ServiceContext,
    ) -> ServiceResult<Reply<()>> {
        let response = request.body.response;
        let request_id = response.request_id;
        if ctx.pending_deferred().complete(response) {
            tracing::debug!(%request_id, "Delivered deferred response");
        } else {
            tracing::warn!(%request_id, "Dropping deferred response nobody is waiting for");
        }
        Ok(Reply::Payload(()))
    }
}
