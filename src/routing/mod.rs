// ABOUTME: Shared routing state: the per-service target pools and the listeners bound to them.
// ABOUTME: Every mutation is keyed by service+pool or service+listener so services never contend.

mod error;
mod listener;
mod pool;

pub use error::RoutingError;
pub use listener::ListenerRouter;
pub use pool::{PoolHealth, TargetPool, TargetPoolRegistry};
