// ABOUTME: Error types for pool and listener operations.
// ABOUTME: PoolInUse and EmptyPool guard the listener/pool invariants.

use crate::types::{Color, ListenerKind, ServiceName};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// The service was never registered.
    #[error("unknown service: {0}")]
    UnknownService(ServiceName),

    /// Attempted to drain a pool a listener still points at.
    #[error("cannot drain {service}/{color}: bound to the {listener} listener")]
    PoolInUse {
        service: ServiceName,
        color: Color,
        listener: ListenerKind,
    },

    /// Attempted to bind a listener to a pool with no endpoints.
    #[error("cannot bind {listener} listener of {service} to empty {color} pool")]
    EmptyPool {
        service: ServiceName,
        color: Color,
        listener: ListenerKind,
    },
}
