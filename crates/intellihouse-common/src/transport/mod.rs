//! Intellihouse Transport Layer
//!
//! This module defines the transport contracts the RPC runtime is written
//! against, plus the pieces every concrete transport shares.
//!
//! # Architecture
//!
//! A transport moves one serialized request and one serialized response:
//! every `send_request`/`receive_request` is matched by exactly one
//! `receive_response`/`send_response`. It is a request/response channel,
//! never a stream.
//!
//! # Components
//!
//! - **[`ClientTransport`]**: sends a request payload, receives the response payload
//! - **[`ServerTransport`]**: receives a request payload, sends the response payload
//! - **[`ClientTransportProvider`]**: hands out client transports bound to a target host
//! - **[`JsonCodec`]**: encodes/decodes envelopes and responses
//! - **[`canonical_endpoint`]**: normalizes a host's base URL to its RPC endpoint

pub mod codec;
pub mod endpoint;

pub use codec::JsonCodec;
pub use endpoint::canonical_endpoint;

use async_trait::async_trait;
use hyper::body::Bytes;
use std::time::Duration;

use crate::protocol::error::Result;
use crate::protocol::ids::HostId;
use crate::protocol::requests::RequestHeader;

/// Client side of a single request/response exchange.
#[async_trait]
pub trait ClientTransport: Send {
    /// Sends the serialized request.
    async fn send_request(&mut self, payload: Bytes) -> Result<()>;

    /// Waits at most `timeout` for the serialized response.
    ///
    /// Returns [`RpcError::Timeout`](crate::RpcError::Timeout) when the
    /// response does not arrive in time.
    async fn receive_response(&mut self, timeout: Duration) -> Result<Bytes>;

    /// Releases resources held by this transport.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Server side of a single request/response exchange.
#[async_trait]
pub trait ServerTransport: Send {
    /// Reads the serialized request.
    async fn receive_request(&mut self) -> Result<Bytes>;

    /// Notifies the transport that the request header has been decoded.
    fn request_received(&mut self, _header: &RequestHeader) {}

    /// Writes the serialized response.
    async fn send_response(&mut self, payload: Bytes) -> Result<()>;
}

/// Factory of client transports, one per invocation or pooled at its discretion.
pub trait ClientTransportProvider: Send + Sync {
    /// Creates a transport bound to `server_host_id`.
    fn create_client_transport(&self, server_host_id: &HostId) -> Result<Box<dyn ClientTransport>>;

    /// Releases pooled resources. Must be idempotent.
    fn close(&self) {}
}

#[cfg(test)]
mod tests;
