//! Resilience patterns for promptos-runtime.
//!
//! Model calls fail for reasons unrelated to the prompt being graded:
//! dropped connections, rate limits, overloaded upstreams. This module
//! holds the retry policy applied around each call.

mod retry;

pub use retry::RetryPolicy;
