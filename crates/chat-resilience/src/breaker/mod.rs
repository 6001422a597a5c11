//! Circuit breakers

mod circuit_breaker;
mod registry;

pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    HALF_OPEN_SUCCESS_THRESHOLD,
};
pub use registry::BreakerRegistry;
