//! Transport implementations.
//!
//! - [`mock`]: in-process transport that calls a target context's server
//!   directly, for tests and single-process setups
//! - [`http_client`]: outbound HTTP POST to a host's canonical endpoint
//! - [`http_server`]: hyper server accepting POSTs on the RPC path

pub mod http_client;
pub mod http_server;
pub mod mock;

pub use http_client::{HttpClientTransport, HttpTransportProvider};
pub use http_server::{HttpServer, HttpServerTransport};
pub use mock::{MockClientTransport, MockServerTransport, MockTransportProvider};
