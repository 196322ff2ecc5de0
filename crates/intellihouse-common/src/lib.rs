//! Intellihouse Common Types and Transport Contracts
//!
//! This crate provides the message model and the transport seams shared by
//! every participant of the intellihouse RPC runtime.
//!
//! # Overview
//!
//! Nodes talk to each other with a point-to-point request/response protocol.
//! A coordinator that needs to reach a node behind NAT cannot open a
//! connection to it, so the runtime also supports *inverse requests* which
//! the node collects by polling. This crate contains the pieces both sides
//! agree on:
//!
//! - **Protocol Layer**: host/channel/request ids, typed [`Request`]s, wire
//!   envelopes, [`Response`]s and the [`RpcError`] taxonomy
//! - **Transport Layer**: the [`ClientTransport`]/[`ServerTransport`] traits,
//!   the JSON codec and endpoint URL canonicalization
//! - **Auth**: payload transforms applied to whole serialized bodies
//!
//! # Wire Format
//!
//! - **Serialization**: JSON, one document per message
//! - **Request tag**: the `type` field names the concrete request type
//! - **HTTP endpoint**: `<base>/intellihouse/RPC`
//!
//! # Example
//!
//! ```
//! use intellihouse_common::{HostId, Request, RpcRequest};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Ping;
//!
//! impl RpcRequest for Ping {
//!     const TYPE: &'static str = "Ping";
//!     type Response = ();
//! }
//!
//! let request = Request::new(HostId::new("coordinator"), Ping).with_timeout(5000);
//! assert_eq!(request.header.timeout_ms, 5000);
//! ```

pub mod auth;
pub mod protocol;
pub mod transport;

pub use auth::{IntegrityHash, PayloadTransform, PlainPayload};
pub use protocol::*;
pub use transport::{
    canonical_endpoint, ClientTransport, ClientTransportProvider, JsonCodec, ServerTransport,
};
