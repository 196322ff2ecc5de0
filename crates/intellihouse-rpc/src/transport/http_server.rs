//! HTTP server for intellihouse RPC
//!
//! Hosts an [`RpcServer`] behind hyper's HTTP/1.1 server. Clients POST a
//! JSON request to `/intellihouse/RPC` and receive the JSON response in the
//! HTTP response body.
//!
//! # Architecture
//!
//! The HTTP server:
//! - Listens on a TCP socket for incoming HTTP connections
//! - Spawns a tokio task for each connection
//! - Rejects other paths with 404 and other methods with 405
//! - Opens the body with the configured payload transform (403 on mismatch)
//! - Hands the request to the RPC server through an [`HttpServerTransport`]
//! - Reports each caller's host id to the presence registry
//!
//! # Example
//!
//! ```no_run
//! use intellihouse_rpc::transport::HttpServer;
//! use intellihouse_rpc::{RpcContext, RpcMode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let context = RpcContext::builder(RpcMode::Server).host_id("coordinator").build();
//!     let server = HttpServer::new(context);
//!     server.run("0.0.0.0:8080".parse().unwrap()).await.unwrap();
//! }
//! ```

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use intellihouse_common::{
    PayloadTransform, PlainPayload, RequestHeader, Result, RpcConst, RpcError, ServerTransport,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::context::RpcContext;
use crate::presence::{NoPresence, PresenceRegistry};
use crate::server::RpcServer;

type HyperRequest = hyper::Request<Incoming>;
type HyperResponse = hyper::Response<Full<Bytes>>;

struct ServerState {
    server: RpcServer,
    transform: Arc<dyn PayloadTransform>,
    presence: Arc<dyn PresenceRegistry>,
}

/// HTTP server exposing one RPC context.
pub struct HttpServer {
    state: Arc<ServerState>,
}

impl HttpServer {
    /// Creates a server for `context` with plain payloads and no presence tracking.
    pub fn new(context: RpcContext) -> Self {
        Self {
            state: Arc::new(ServerState {
                server: context.create_rpc_server(),
                transform: Arc::new(PlainPayload),
                presence: Arc::new(NoPresence),
            }),
        }
    }

    pub fn with_transform(self, transform: Arc<dyn PayloadTransform>) -> Self {
        self.rebuild(|state| state.transform = transform)
    }

    pub fn with_presence(self, presence: Arc<dyn PresenceRegistry>) -> Self {
        self.rebuild(|state| state.presence = presence)
    }

    fn rebuild(self, update: impl FnOnce(&mut ServerState)) -> Self {
        let mut state = ServerState {
            server: self.state.server.clone(),
            transform: self.state.transform.clone(),
            presence: self.state.presence.clone(),
        };
        update(&mut state);
        Self {
            state: Arc::new(state),
        }
    }

    /// Binds `addr` and serves until accepting a connection fails.
    ///
    /// # Arguments
    ///
    /// * `addr` - The socket address to bind to
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves connections accepted from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "HTTP server listening on {}/{}",
            listener
                .local_addr()
                .map_err(|e| RpcError::Transport(format!("Failed to get local address: {}", e)))?,
            RpcConst::SERVLET_PATH
        );

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .map_err(|e| RpcError::Transport(format!("Failed to accept connection: {}", e)))?;

            let io = TokioIo::new(stream);
            let state = self.state.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move { Self::handle_request(state, req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("Error serving connection from {}: {}", peer, err);
                }
            });
        }
    }

    async fn handle_request(
        state: Arc<ServerState>,
        req: HyperRequest,
    ) -> std::result::Result<HyperResponse, Infallible> {
        if req.uri().path().trim_start_matches('/') != RpcConst::SERVLET_PATH {
            return Ok(status_response(StatusCode::NOT_FOUND, "Not found"));
        }
        if req.method() != Method::POST {
            return Ok(status_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Only POST requests are supported",
            ));
        }

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                return Ok(status_response(StatusCode::BAD_REQUEST, "Unreadable body"));
            }
        };

        let payload = match state.transform.open(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Rejected request payload: {}", e);
                return Ok(status_response(StatusCode::FORBIDDEN, "Payload rejected"));
            }
        };

        let mut transport = HttpServerTransport::new(payload, state.presence.clone());
        if let Err(e) = state.server.receive_and_process_request(&mut transport).await {
            tracing::error!("Error handling request: {}", e);
            return Ok(status_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"));
        }

        let sealed = transport
            .take_response()
            .ok_or_else(|| RpcError::Transport("Server sent no response".to_string()))
            .and_then(|response| state.transform.seal(response));
        match sealed {
            Ok(body) => Ok(hyper::Response::builder()
                .status(StatusCode::OK)
                .header(hyper::header::CONTENT_TYPE, "application/json")
                .body(Full::new(body))
                .unwrap_or_else(|_| status_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))),
            Err(e) => {
                tracing::error!("Failed to seal response: {}", e);
                Ok(status_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
            }
        }
    }
}

fn status_response(status: StatusCode, message: &'static str) -> HyperResponse {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
}

/// Server end of one HTTP exchange.
///
/// Marks the calling host as seen once the request header is decoded.
pub struct HttpServerTransport {
    request: Option<Bytes>,
    response: Option<Bytes>,
    presence: Arc<dyn PresenceRegistry>,
}

impl HttpServerTransport {
    pub fn new(request: Bytes, presence: Arc<dyn PresenceRegistry>) -> Self {
        Self {
            request: Some(request),
            response: None,
            presence,
        }
    }

    pub fn take_response(&mut self) -> Option<Bytes> {
        self.response.take()
    }
}

#[async_trait]
impl ServerTransport for HttpServerTransport {
    async fn receive_request(&mut self) -> Result<Bytes> {
        self.request
            .take()
            .ok_or_else(|| RpcError::Transport("Request already consumed".to_string()))
    }

    fn request_received(&mut self, header: &RequestHeader) {
        if let Some(host_id) = &header.client_host_id {
            self.presence.mark_seen(host_id);
        }
    }

    async fn send_response(&mut self, payload: Bytes) -> Result<()> {
        self.response = Some(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::InMemoryPresence;
    use intellihouse_common::HostId;

    #[test]
    fn test_transport_marks_caller_seen() {
        let presence = Arc::new(InMemoryPresence::new());
        let mut transport = HttpServerTransport::new(Bytes::new(), presence.clone());

        let mut header = RequestHeader::new(HostId::new("coordinator"));
        header.client_host_id = Some(HostId::new("pi-attic"));
        transport.request_received(&header);

        assert!(presence.is_online(&HostId::new("pi-attic")));
    }

    #[test]
    fn test_status_response() {
        let response = status_response(StatusCode::NOT_FOUND, "Not found");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
