//! Access to the remote transaction service.

mod provider;
mod remote;
mod retry;
mod transport;

pub use provider::Provider;
pub use remote::{RemoteClient, RemoteClientBuilder, MIN_SUBSCRIBE_ADDRESSES};
pub use retry::{async_sleep, classify, RetryDecision, RetryPolicy};
pub use transport::{ReqwestTransport, Transport};
