//! Intellihouse RPC Runtime
//!
//! This crate ties remote nodes to a central coordinator. A node normally
//! calls the coordinator over outbound HTTP; the coordinator reaches a node
//! behind NAT through *inverse requests* that the node collects with a
//! long-poll, and answers slow calls with a *deferring response* whose real
//! result follows the same inverse path.
//!
//! # Components
//!
//! - [`RpcContext`]: process role, local host id, registries, transport provider
//! - [`RpcClient`]: serializes, sends and waits for one request
//! - [`RpcServer`]: decodes, dispatches and answers one request
//! - [`RpcServiceRegistry`]: services keyed by request type (and channel)
//! - [`InverseRequestRegistry`]: per-host FIFO queues drained by polling
//! - [`transport`]: in-process mock and HTTP transports
//!
//! # Example
//!
//! ```no_run
//! use intellihouse_rpc::{EchoRequest, RpcContext, RpcMode};
//! use intellihouse_rpc::transport::HttpTransportProvider;
//! use intellihouse_common::{HostId, Request};
//! use std::sync::Arc;
//!
//! # async fn run() -> intellihouse_common::Result<()> {
//! let provider = HttpTransportProvider::default()
//!     .with_endpoint(HostId::new("coordinator"), "http://192.168.1.10:8080")?;
//! let context = RpcContext::builder(RpcMode::Client)
//!     .transport_provider(Arc::new(provider))
//!     .build();
//!
//! let client = context.create_rpc_client();
//! let echo = client
//!     .invoke(Request::new(HostId::new("coordinator"), EchoRequest::new("x")))
//!     .await?;
//! assert_eq!(echo.payload, "x");
//! context.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod deferred;
pub mod echo;
pub mod inverse;
pub mod pending;
pub mod presence;
pub mod server;
pub mod service;
pub mod transport;

pub use client::RpcClient;
pub use config::{RpcConfig, RpcMode};
pub use context::{RpcContext, RpcContextBuilder};
pub use deferred::{DeliverDeferredResponseRequest, DeliverDeferredResponseService};
pub use echo::{EchoError, EchoRequest, EchoResponse, EchoService};
pub use inverse::{
    InversePoller, InverseRequestRegistry, PollInverseRequestsRequest, PollInverseRequestsResponse,
    PollInverseRequestsService, PutInverseResponseRequest, PutInverseResponseService,
};
pub use pending::PendingResponses;
pub use presence::{InMemoryPresence, NoPresence, PresenceRegistry};
pub use server::RpcServer;
pub use service::{Deferral, Reply, RpcService, RpcServiceRegistry, ServiceContext, ServiceResult};
