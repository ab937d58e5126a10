//! # circuitbreaker-client
//!
//! A resilient HTTP client for a single upstream dependency. Every request is
//! bounded by a deadline and guarded by a three-state circuit breaker that
//! stops calling a failing dependency and later probes it for recovery.
//!
//! ## What is a Circuit Breaker?
//!
//! The Circuit Breaker pattern helps prevent cascading failures in distributed systems
//! by temporarily disabling operations that are likely to fail. This pattern is inspired
//! by electrical circuit breakers and operates in three states:
//!
//! - **Closed**: Normal operation. Calls pass through; consecutive failures are counted
//!   and the circuit opens once they reach the configured threshold.
//! - **Open**: Calls are immediately rejected without attempting to reach the dependency.
//! - **Half-Open**: After the cooldown, exactly one probe call is permitted. Its success
//!   closes the circuit, its failure opens it again and restarts the cooldown.
//!
//! ## Basic Usage
//!
//! ```rust
//! use circuitbreaker_client::{BreakerState, Client, ClientError, ScriptedTransport};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Debug, Deserialize)]
//! struct Health {
//!     status: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let transport = ScriptedTransport::new();
//! transport.respond(200, r#"{"status":"ok"}"#);
//!
//! let client = Client::builder()
//!     .base_address("http://localhost:8080")
//!     .timeout(Duration::from_secs(2))
//!     .failure_threshold(3)
//!     .cooldown(Duration::from_secs(5))
//!     .transport(transport)
//!     .build()
//!     .unwrap();
//!
//! match client.get_json::<Health>("/health").await {
//!     Ok(health) => println!("upstream is {}", health.status),
//!     Err(ClientError::CircuitOpen { retry_after }) => {
//!         println!("circuit open, retry in {:?}", retry_after)
//!     }
//!     Err(err) => println!("request failed: {}", err),
//! }
//! assert_eq!(client.state(), BreakerState::Closed);
//! # });
//! ```
//!
//! ## Using the breaker directly
//!
//! [`CircuitBreaker`] can guard any operation. Each call must be admitted and
//! its outcome reported through the returned [`Permit`]:
//!
//! ```rust
//! use circuitbreaker_client::{CircuitBreaker, FailureKind};
//!
//! let breaker = CircuitBreaker::builder().failure_threshold(2).build();
//! match breaker.admit() {
//!     Ok(permit) => permit.failed(FailureKind::Transport),
//!     Err(rejection) => println!("fail fast: {}", rejection),
//! }
//! ```
//!
//! ## Features
//!
//! - `reqwest` - [`ReqwestTransport`] and [`Client::new`] (default)
//! - `prometheus` - `PrometheusSink` for `prometheus-client` registries
//! - `testing` - `ScriptedTransport`, an in-memory transport for tests

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod client;
mod clock;
mod config;
mod error;
mod hook;
mod invoker;
mod metrics;
mod path;
pub mod prelude;
mod response;
mod state;
#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;
mod transport;

// Re-exports
pub use breaker::{CircuitBreaker, Permit};
pub use client::Client;
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{BreakerBuilder, ClientBuilder, ClientConfig};
pub use error::{ClientError, ClientResult, Rejection, TransportError};
pub use hook::HookRegistry;
#[cfg(feature = "prometheus")]
pub use metrics::PrometheusSink;
pub use metrics::{MetricSink, NullMetricSink, StatsSnapshot};
pub use path::{validate_path, MAX_PATH_LEN};
pub use response::{body_prefix, ResponseValidator, BODY_PREFIX_LIMIT, SUCCESS_STATUSES};
pub use state::{BreakerState, FailureKind, Outcome, Transition};
#[cfg(any(test, feature = "testing"))]
pub use testing::ScriptedTransport;
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use transport::{BodyStream, RawResponse, Transport, TransportRequest};
