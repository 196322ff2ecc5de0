pub mod constants;
pub mod error;
pub mod ids;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use constants::RpcConst;
pub use error::{RemoteException, Result, RpcError};
pub use ids::{ChannelId, HostId, RequestId};
pub use requests::{Request, RequestEnvelope, RequestHeader, RpcRequest};
pub use responses::{RemoteError, RemoteErrorKind, Response, ResponseBody};
