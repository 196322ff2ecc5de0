use intellihouse_common::{HostId, Request, RequestEnvelope, RpcError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::messages::{PollInverseRequestsRequest, PutInverseResponseRequest};
use crate::context::RpcContext;
use crate::service::Deferral;

/// Background loop that collects and executes inverse requests for one server.
///
/// Polling and execution run as two tasks joined by a channel: batches are
/// executed one request at a time in arrival order while the next poll is
/// already waiting on the server. Dropping the poller stops both tasks.
pub struct InversePoller {
    server_host_id: HostId,
    poll_task: JoinHandle<()>,
    execute_task: JoinHandle<()>,
}

impl InversePoller {
    /// Starts polling `server_host_id` on the current tokio runtime.
    pub fn spawn(context: RpcContext, server_host_id: HostId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let execute_task = tokio::spawn(execute_loop(context.clone(), server_host_id.clone(), rx));
        let poll_task = tokio::spawn(poll_loop(context, server_host_id.clone(), tx));

        tracing::info!(server = %server_host_id, "Inverse polling started");
        Self {
            server_host_id,
            poll_task,
            execute_task,
        }
    }

    pub fn server_host_id(&self) -> &HostId {
        &self.server_host_id
    }

    pub fn is_running(&self) -> bool {
        !self.poll_task.is_finished()
    }

    pub fn stop(&self) {
        self.poll_task.abort();
        self.execute_task.abort();
    }
}

impl Drop for InversePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    context: RpcContext,
    server_host_id: HostId,
    batches: mpsc::UnboundedSender<Vec<RequestEnvelope>>,
) {
    let client = context.create_rpc_client();
    let poll_timeout_ms = context.config().transport_timeout.as_millis() as u64;
    let early_return = context.config().poll_budget() / 2;

    while !context.is_closed() {
        let started = tokio::time::Instant::now();
        let poll = Request::new(server_host_id.clone(), PollInverseRequestsRequest::default())
            .with_timeout(poll_timeout_ms)
            .idempotent();

        match client.invoke(poll).await {
            Ok(batch) => {
                if batch.requests.is_empty() {
                    // server is not holding polls, e.g. while shutting down
                    if started.elapsed() < early_return {
                        tokio::time::sleep(context.config().poll_retry_delay).await;
                    }
                    continue;
                }
                tracing::debug!(count = batch.requests.len(), "Received inverse requests");
                if batches.send(batch.requests).is_err() {
                    break;
                }
            }
            Err(RpcError::Closed) => break,
            Err(e) => {
                tracing::warn!(server = %server_host_id, error = %e, "Inverse poll failed");
                tokio::time::sleep(context.config().poll_retry_delay).await;
            }
        }
    }

    tracing::info!(server = %server_host_id, "Inverse polling stopped");
}

async fn execute_loop(
    context: RpcContext,
    server_host_id: HostId,
    mut batches: mpsc::UnboundedReceiver<Vec<RequestEnvelope>>,
) {
    let client = context.create_rpc_client();
    let server = context.create_rpc_server();

    while let Some(batch) = batches.recv().await {
        for envelope in batch {
            let request_type = envelope.request_type.clone();
            let response = server.process_request(envelope, Deferral::Disallowed).await;

            let put = Request::new(server_host_id.clone(), PutInverseResponseRequest { response })
                .idempotent();
            if let Err(e) = client.invoke(put).await {
                tracing::warn!(
                    server = %server_host_id,
                    request_type = %request_type,
                    error = %e,
                    "Failed to return inverse response"
                );
            }
        }
    }
}
