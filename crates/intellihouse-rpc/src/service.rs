//! Service abstraction and registry.
//!
//! A service handles exactly one request type. Services are plain synchronous
//! code: the server runs each invocation on the blocking pool, so a service
//! may sleep or block on hardware I/O without stalling the transport.
//!
//! # Example
//!
//! ```
//! use intellihouse_common::{Request, RpcRequest};
//! use intellihouse_rpc::{Reply, RpcService, ServiceContext, ServiceResult};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct ReadTemperature;
//!
//! impl RpcRequest for ReadTemperature {
//!     const TYPE: &'static str = "ReadTemperature";
//!     type Response = f64;
//! }
//!
//! struct Thermometer;
//!
//! impl RpcService<ReadTemperature> for Thermometer {
//!     fn process(
//!         &self,
//!         _request: Request<ReadTemperature>,
//!         _ctx: &ServiceContext,
//!     ) -> ServiceResult<Reply<f64>> {
//!         Ok(Reply::Payload(21.5))
//!     }
//! }
//! ```

use intellihouse_common::{
    ChannelId, HostId, RemoteError, RemoteErrorKind, Request, RequestEnvelope, RequestHeader,
    RequestId, Response, RpcRequest,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RpcConfig;
use crate::context::RpcContext;
use crate::inverse::InverseRequestRegistry;
use crate::pending::PendingResponses;
use crate::server::panic_message;

pub type ServiceResult<T> = std::result::Result<T, RemoteError>;

/// Outcome of a service invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    /// Answer now
    Payload(T),
    /// The real answer is delivered later through the inverse path
    Deferred,
}

impl<T> From<T> for Reply<T> {
    fn from(payload: T) -> Self {
        Reply::Payload(payload)
    }
}

/// Handler for one request type.
pub trait RpcService<R: RpcRequest>: Send + Sync + 'static {
    fn process(&self, request: Request<R>, ctx: &ServiceContext) -> ServiceResult<Reply<R::Response>>;
}

/// Whether a service invocation may answer with a deferring response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    Allowed,
    /// Requests executed on behalf of an inverse poll
    Disallowed,
}

/// Per-invocation view of the runtime handed to services.
pub struct ServiceContext {
    context: RpcContext,
    header: RequestHeader,
    deferral: Deferral,
}

impl ServiceContext {
    pub(crate) fn new(context: RpcContext, header: RequestHeader, deferral: Deferral) -> Self {
        Self {
            context,
            header,
            deferral,
        }
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn local_host_id(&self) -> &HostId {
        self.context.host_id()
    }

    pub fn config(&self) -> &RpcConfig {
        self.context.config()
    }

    /// Deferral needs a caller that can be reached through the inverse path.
    pub fn may_defer(&self) -> bool {
        self.deferral == Deferral::Allowed
            && self.header.request_id.is_some()
            && self.header.client_host_id.is_some()
    }

    /// Whether work expected to take `expected` should be deferred.
    pub fn should_defer(&self, expected: Duration) -> bool {
        self.may_defer() && expected >= self.config().defer_threshold
    }

    /// Runs `work` in the background and answers with [`Reply::Deferred`].
    ///
    /// `work` runs on the blocking pool. When it finishes, its result is
    /// queued as an inverse request for the calling host, which completes the
    /// waiting invocation. A panic in `work` is delivered as an error response
    /// of kind [`RemoteErrorKind::Panic`].
    pub fn defer<T, F>(&self, work: F) -> ServiceResult<Reply<T>>
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> ServiceResult<T> + Send + 'static,
    {
        let (Some(request_id), Some(client_host_id)) =
            (self.header.request_id, self.header.client_host_id.clone())
        else {
            return Err(RemoteError::invalid_request(
                "Deferral needs a request id and a client host id",
            ));
        };
        if self.deferral == Deferral::Disallowed {
            return Err(RemoteError::invalid_request(
                "Deferral is not available for inverse requests",
            ));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| RemoteError::from_error(&e))?;
        let context = self.context.clone();
        let channel_id = self.header.channel_id.clone();
        let work = runtime.spawn_blocking(work);
        runtime.spawn(async move {
            let response = match work.await {
                Ok(Ok(payload)) => Response::with_payload(request_id, &payload)
                    .unwrap_or_else(|e| Response::error(request_id, RemoteError::from_rpc_error(&e))),
                Ok(Err(error)) => Response::error(request_id, error),
                Err(join_error) => {
                    let message = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "Deferred work was cancelled".to_string()
                    };
                    tracing::error!(%request_id, %message, "Deferred work panicked");
                    Response::error(
                        request_id,
                        RemoteError::new(RemoteErrorKind::Panic, "DeferredWork", message),
                    )
                }
            };
            context.deliver_deferred(client_host_id, response.with_channel(channel_id));
        });

        Ok(Reply::Deferred)
    }

    pub(crate) fn inverse_requests(&self) -> &InverseRequestRegistry {
        self.context.inverse_requests()
    }

    pub(crate) fn pending_inverse(&self) -> &PendingResponses {
        self.context.pending_inverse()
    }

    pub(crate) fn pending_deferred(&self) -> &PendingResponses {
        self.context.pending_deferred()
    }
}

/// Type-erased service invoked with a raw envelope.
pub(crate) trait DynService: Send + Sync {
    fn handle(&self, envelope: RequestEnvelope, ctx: &ServiceContext) -> Response;
}

struct TypedService<R, S> {
    service: S,
    _request: PhantomData<fn() -> R>,
}

impl<R, S> DynService for TypedService<R, S>
where
    R: RpcRequest,
    S: RpcService<R>,
{
    fn handle(&self, envelope: RequestEnvelope, ctx: &ServiceContext) -> Response {
        let request_id = envelope.header.request_id.unwrap_or_else(RequestId::nil);
        let channel_id = envelope.header.channel_id.clone();

        let response = match Request::<R>::from_envelope(envelope) {
            Err(e) => Response::error(request_id, RemoteError::from_rpc_error(&e)),
            Ok(request) => match self.service.process(request, ctx) {
                Ok(Reply::Payload(payload)) => Response::with_payload(request_id, &payload)
                    .unwrap_or_else(|e| Response::error(request_id, RemoteError::from_rpc_error(&e))),
                Ok(Reply::Deferred) => Response::deferring(request_id),
                Err(error) => Response::error(request_id, error),
            },
        };
        response.with_channel(channel_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ServiceKey {
    request_type: String,
    channel_id: Option<ChannelId>,
}

/// Services of one context, keyed by request type and optionally channel.
///
/// Lookups with a channel try the channel-specific registration first and
/// fall back to the service registered for the type alone.
#[derive(Default)]
pub struct RpcServiceRegistry {
    services: RwLock<HashMap<ServiceKey, Arc<dyn DynService>>>,
}

impl RpcServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` for `R`, replacing any earlier registration.
    pub fn register<R, S>(&self, service: S)
    where
        R: RpcRequest,
        S: RpcService<R>,
    {
        self.insert::<R, S>(None, service);
    }

    /// Registers `service` for `R` requests addressed to `channel_id`.
    pub fn register_channel<R, S>(&self, channel_id: ChannelId, service: S)
    where
        R: RpcRequest,
        S: RpcService<R>,
    {
        self.insert::<R, S>(Some(channel_id), service);
    }

    fn insert<R, S>(&self, channel_id: Option<ChannelId>, service: S)
    where
        R: RpcRequest,
        S: RpcService<R>,
    {
        let key = ServiceKey {
            request_type: R::TYPE.to_string(),
            channel_id,
        };
        let service: Arc<dyn DynService> = Arc::new(TypedService {
            service,
            _request: PhantomData,
        });
        if self.services.write().insert(key, service).is_some() {
            tracing::debug!(request_type = R::TYPE, "Replaced registered service");
        }
    }

    pub fn contains(&self, request_type: &str) -> bool {
        self.services
            .read()
            .keys()
            .any(|key| key.request_type == request_type)
    }

    /// Registered request types, sorted and without duplicates.
    pub fn request_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .services
            .read()
            .keys()
            .map(|key| key.request_type.clone())
            .collect();
        types.sort();
        types.dedup();
        types
    }

    pub(crate) fn lookup(
        &self,
        request_type: &str,
        channel_id: Option<&ChannelId>,
    ) -> Option<Arc<dyn DynService>> {
        let services = self.services.read();
        let mut key = ServiceKey {
            request_type: request_type.to_string(),
            channel_id: channel_id.cloned(),
        };
        if let Some(service) = services.get(&key) {
            return Some(service.clone());
        }
        if key.channel_id.is_none() {
            return None;
        }
        key.channel_id = None;
        services.get(&key).cloned()
    }
}
