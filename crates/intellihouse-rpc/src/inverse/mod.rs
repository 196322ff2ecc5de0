//! Inverse requests: server-to-client calls carried over client-initiated polls.
//!
//! A node behind NAT cannot accept connections, so the coordinator queues
//! requests for it in the [`InverseRequestRegistry`]. The node's
//! [`InversePoller`] collects them with [`PollInverseRequestsRequest`],
//! executes them locally and returns each result with
//! [`PutInverseResponseRequest`], which completes the coordinator's waiter.

mod messages;
mod poller;
mod registry;
mod transport;

pub use messages::{
    PollInverseRequestsRequest, PollInverseRequestsResponse, PollInverseRequestsService,
    PutInverseResponseRequest, PutInverseResponseService,
};
pub use poller::InversePoller;
pub use registry::InverseRequestRegistry;
pub use transport::{InverseClientTransport, InverseTransportProvider};
