//! The RPC context: one per process role.

use intellihouse_common::{
    ClientTransportProvider, HostId, Request, Response, Result, RpcError, RequestId,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::RpcClient;
use crate::config::{RpcConfig, RpcMode};
use crate::deferred::{DeliverDeferredResponseRequest, DeliverDeferredResponseService};
use crate::echo::{EchoRequest, EchoService};
use crate::inverse::{
    InversePoller, InverseRequestRegistry, InverseTransportProvider, PollInverseRequestsRequest,
    PollInverseRequestsService, PutInverseResponseRequest, PutInverseResponseService,
};
use crate::pending::PendingResponses;
use crate::server::RpcServer;
use crate::service::RpcServiceRegistry;
use crate::transport::HttpTransportProvider;

struct Shared {
    mode: RpcMode,
    host_id: HostId,
    config: RpcConfig,
    services: RpcServiceRegistry,
    inverse_requests: InverseRequestRegistry,
    /// Coordinator side: inverse requests awaiting their put
    pending_inverse: PendingResponses,
    /// Client side: invocations awaiting a deferred delivery
    pending_deferred: PendingResponses,
    transport_provider: RwLock<Arc<dyn ClientTransportProvider>>,
    poller: Mutex<Option<InversePoller>>,
    closed: AtomicBool,
}

/// Owns everything one process role needs: the local host id, service
/// registry, inverse request queues, pending waiters and transport provider.
///
/// Cloning is cheap and yields a handle to the same context.
///
/// Built-in services are registered according to the mode: servers answer
/// polls and puts, clients accept deferred deliveries, and both answer echo.
#[derive(Clone)]
pub struct RpcContext {
    shared: Arc<Shared>,
}

impl RpcContext {
    /// Creates a context with the local host id and default configuration.
    pub fn new(mode: RpcMode) -> Self {
        Self::builder(mode).build()
    }

    pub fn builder(mode: RpcMode) -> RpcContextBuilder {
        RpcContextBuilder {
            mode,
            host_id: None,
            config: RpcConfig::default(),
            transport_provider: None,
        }
    }

    pub fn mode(&self) -> RpcMode {
        self.shared.mode
    }

    pub fn host_id(&self) -> &HostId {
        &self.shared.host_id
    }

    pub fn config(&self) -> &RpcConfig {
        &self.shared.config
    }

    pub fn services(&self) -> &RpcServiceRegistry {
        &self.shared.services
    }

    pub fn inverse_requests(&self) -> &InverseRequestRegistry {
        &self.shared.inverse_requests
    }

    pub fn transport_provider(&self) -> Arc<dyn ClientTransportProvider> {
        self.shared.transport_provider.read().clone()
    }

    /// Replaces the provider used by clients created afterwards.
    pub fn set_transport_provider(&self, provider: Arc<dyn ClientTransportProvider>) {
        *self.shared.transport_provider.write() = provider;
    }

    /// Client that reaches hosts through the context's transport provider.
    pub fn create_rpc_client(&self) -> RpcClient {
        RpcClient::new(self.clone(), self.transport_provider())
    }

    /// Client that reaches polling hosts by queuing inverse requests.
    pub fn create_inverse_rpc_client(&self) -> RpcClient {
        RpcClient::new(self.clone(), Arc::new(InverseTransportProvider::new(self.clone())))
    }

    pub fn create_rpc_server(&self) -> RpcServer {
        RpcServer::new(self.clone())
    }

    /// Starts collecting inverse requests from `server_host_id`.
    ///
    /// Replaces a poller that is already running. Must be called within a
    /// tokio runtime.
    pub fn start_inverse_polling(&self, server_host_id: HostId) -> Result<()> {
        self.ensure_open()?;
        if !self.shared.mode.is_client() {
            return Err(RpcError::InvalidRequest(
                "Inverse polling needs a client context".to_string(),
            ));
        }

        let poller = InversePoller::spawn(self.clone(), server_host_id);
        if let Some(previous) = self.shared.poller.lock().replace(poller) {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_inverse_polling(&self) {
        if let Some(poller) = self.shared.poller.lock().take() {
            poller.stop();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.shared
            .poller
            .lock()
            .as_ref()
            .is_some_and(|poller| poller.is_running())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Releases the context. Safe to call more than once.
    ///
    /// Stops polling, closes the transport provider, wakes blocked polls and
    /// fails every invocation still waiting for an inverse or deferred response.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.stop_inverse_polling();
        self.transport_provider().close();
        self.shared.inverse_requests.close();
        self.shared.pending_inverse.clear();
        self.shared.pending_deferred.clear();
        tracing::info!(host = %self.shared.host_id, "RPC context closed");
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(RpcError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn pending_inverse(&self) -> &PendingResponses {
        &self.shared.pending_inverse
    }

    pub(crate) fn pending_deferred(&self) -> &PendingResponses {
        &self.shared.pending_deferred
    }

    /// Queues the final response of a deferred request for its caller.
    pub(crate) fn deliver_deferred(&self, client_host_id: HostId, response: Response) {
        let request_id = response.request_id;
        let delivery = Request::new(client_host_id.clone(), DeliverDeferredResponseRequest { response })
            .with_request_id(RequestId::generate());
        let mut envelope = match delivery.into_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(%request_id, error = %e, "Failed to encode deferred response");
                return;
            }
        };
        envelope.header.client_host_id = Some(self.shared.host_id.clone());

        self.shared.inverse_requests.enqueue(&client_host_id, envelope);
        tracing::debug!(%request_id, client = %client_host_id, "Queued deferred response");
    }
}

/// Builder for [`RpcContext`].
pub struct RpcContextBuilder {
    mode: RpcMode,
    host_id: Option<HostId>,
    config: RpcConfig,
    transport_provider: Option<Arc<dyn ClientTransportProvider>>,
}

impl RpcContextBuilder {
    pub fn host_id(mut self, host_id: impl Into<HostId>) -> Self {
        self.host_id = Some(host_id.into());
        self
    }

    pub fn config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport_provider(mut self, provider: Arc<dyn ClientTransportProvider>) -> Self {
        self.transport_provider = Some(provider);
        self
    }

    pub fn build(self) -> RpcContext {
        let transport_provider = self.transport_provider.unwrap_or_else(|| {
            Arc::new(HttpTransportProvider::new(self.config.transport_timeout))
        });

        let services = RpcServiceRegistry::new();
        services.register::<EchoRequest, _>(EchoService);
        if self.mode.is_server() {
            services.register::<PollInverseRequestsRequest, _>(PollInverseRequestsService);
            services.register::<PutInverseResponseRequest, _>(PutInverseResponseService);
        }
        if self.mode.is_client() {
            services.register::<DeliverDeferredResponseRequest, _>(DeliverDeferredResponseService);
        }

        let host_id = self.host_id.unwrap_or_else(HostId::local);
        tracing::debug!(host = %host_id, mode = ?self.mode, "RPC context created");

        RpcContext {
            shared: Arc::new(Shared {
                mode: self.mode,
                host_id,
                config: self.config,
                services,
                inverse_requests: InverseRequestRegistry::new(),
                pending_inverse: PendingResponses::new(),
                pending_deferred: PendingResponses::new(),
                transport_provider: RwLock::new(transport_provider),
                poller: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_services_per_mode() {
        let server = RpcContext::builder(RpcMode::Server).host_id("coordinator").build();
        assert_eq!(
            server.services().request_types(),
            vec!["Echo", "PollInverseRequests", "PutInverseResponse"]
        );

        let client = RpcContext::builder(RpcMode::Client).host_id("pi").build();
        assert_eq!(
            client.services().request_types(),
            vec!["DeliverDeferredResponse", "Echo"]
        );

        assert_eq!(RpcContext::new(RpcMode::Both).services().request_types().len(), 4);
    }

    #[test]
    fn test_close_is_idempotent() {
        let context = RpcContext::builder(RpcMode::Server).host_id("coordinator").build();
        let _waiter = context.pending_inverse().register(RequestId::generate());

        context.close();
        context.close();
        assert!(context.is_closed());
        assert!(context.pending_inverse().is_empty());
    }

    #[tokio::test]
    async fn test_polling_needs_client_mode() {
        let server = RpcContext::builder(RpcMode::Server).host_id("coordinator").build();
        assert!(server.start_inverse_polling(HostId::new("elsewhere")).is_err());

        let client = RpcContext::builder(RpcMode::Client).host_id("pi").build();
        client.start_inverse_polling(HostId::new("coordinator")).unwrap();
        assert!(client.is_polling());
        client.close();
        assert!(!client.is_polling());
    }

    #[test]
    fn test_deferred_delivery_is_queued_for_client() {
        let server = RpcContext::builder(RpcMode::Server).host_id("coordinator").build();
        let client = HostId::new("pi");

        server.deliver_deferred(client.clone(), Response::void(RequestId::generate()));

        let batch = server
            .inverse_requests()
            .poll_requests(&client, std::time::Duration::from_millis(10));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].request_type, "DeliverDeferredResponse");
        assert_eq!(batch[0].header.client_host_id, Some(HostId::new("coordinator")));
    }
}
