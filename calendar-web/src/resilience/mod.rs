// SPDX-License-Identifier: Apache-2.0
//! Resilience primitives wrapped around every delegated backend call.
//!
//! Applied outermost-first: bulkhead, then circuit breaker, then retry,
//! then a per-attempt timeout.

pub mod breaker;
pub mod bulkhead;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerPermit, BreakerState, CircuitBreaker, CircuitOpen};
pub use bulkhead::{Bulkhead, BulkheadFull};
pub use retry::RetryPolicy;
