//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use circuitbreaker_client::prelude::*;
//! ```

pub use crate::{
    BreakerState, CircuitBreaker, Client, ClientConfig, ClientError, ClientResult, FailureKind,
    Outcome, Transport,
};
