use intellihouse_common::{RemoteError, Request, RequestEnvelope, Response, RpcRequest};
use serde::{Deserialize, Serialize};

use crate::service::{Reply, RpcService, ServiceContext, ServiceResult};

/// Long-poll for inverse requests queued for the calling host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollInverseRequestsRequest {}

impl RpcRequest for PollInverseRequestsRequest {
    const TYPE: &'static str = "PollInverseRequests";
    type Response = PollInverseRequestsResponse;
}

/// Requests collected by one poll, oldest first. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollInverseRequestsResponse {
    pub requests: Vec<RequestEnvelope>,
}

/// Result of an inverse request, returned by the host that executed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutInverseResponseRequest {
    pub response: Response,
}

impl RpcRequest for PutInverseResponseRequest {
    const TYPE: &'static str = "PutInverseResponse";
    type Response = ();
}

/// Drains the caller's queue, blocking for at most 90% of the poll's timeout.
pub struct PollInverseRequestsService;

impl RpcService<PollInverseRequestsRequest> for PollInverseRequestsService {
    fn process(
        &self,
        request: Request<PollInverseRequestsRequest>,
        ctx: &ServiceContext,
    ) -> ServiceResult<Reply<PollInverseRequestsResponse>> {
        let timeout = request.header.effective_timeout(ctx.config().transport_timeout);
        let host_id = request
            .header
            .client_host_id
            .ok_or_else(|| RemoteError::invalid_request("Poll request without client host id"))?;
        let budget = intellihouse_common::RpcConst::poll_budget(timeout);
        let requests = ctx.inverse_requests().poll_requests(&host_id, budget);
        if !requests.is_empty() {
            tracing::debug!(host = %host_id, count = requests.len(), "Handing out inverse requests");
        }

        Ok(Reply::Payload(PollInverseRequestsResponse { requests }))
    }
}

/// Completes the coordinator-side waiter of an inverse request.
pub struct PutInverseResponseService;

impl RpcService<PutInverseResponseRequest> for PutInverseResponseService {
    fn process(
        &self,
        request: Request<PutInverseResponseRequest>,
        ctx: &ServiceContext,
    ) -> ServiceResult<Reply<()>> {
        let response = request.body.response;
        let request_id = response.request_id;
        if !ctx.pending_inverse().complete(response) {
            tracing::debug!(%request_id, "Dropping unmatched inverse response");
        }
        Ok(Reply::Payload(()))
    }
}
