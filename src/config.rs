//! Configuration and builders for breakers and clients.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::breaker::CircuitBreaker;
use crate::client::Client;
use crate::clock::{Clock, TokioClock};
use crate::error::{ClientError, ClientResult};
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::response::{ResponseValidator, SUCCESS_STATUSES};
use crate::transport::Transport;

/// Client configuration.
///
/// Deserializes from the camelCase surface
/// `{ baseAddress, timeoutMs, failureThreshold, cooldownMs, maxResponseBytes }`.
/// Missing keys take the documented defaults; unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientConfig {
    /// Base address every request path is appended to.
    #[serde(default = "default_base_address")]
    pub base_address: String,

    /// Deadline for one attempt, body read included, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is allowed, in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Largest accepted response body, in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

fn default_base_address() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_max_response_bytes() -> usize {
    1024 * 1024
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_address: default_base_address(),
            timeout_ms: default_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl ClientConfig {
    /// Parses a JSON document and validates it.
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ClientError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Attempt deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Open-state cooldown.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Parses and checks the base address.
    pub fn base_url(&self) -> ClientResult<Url> {
        let url = Url::parse(&self.base_address).map_err(|e| {
            ClientError::InvalidConfig(format!("invalid base address {:?}: {}", self.base_address, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig(format!(
                "base address scheme must be http or https, got {:?}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ClientError::InvalidConfig(
                "base address has no host".to_string(),
            ));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(ClientError::InvalidConfig(
                "base address must not carry a query or fragment".to_string(),
            ));
        }

        Ok(url)
    }

    /// Checks every field.
    pub fn validate(&self) -> ClientResult<()> {
        self.base_url()?;

        if self.timeout_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "timeoutMs must be greater than zero".to_string(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(ClientError::InvalidConfig(
                "failureThreshold must be at least 1".to_string(),
            ));
        }
        if self.max_response_bytes == 0 {
            return Err(ClientError::InvalidConfig(
                "maxResponseBytes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: Arc<HookRegistry>,
}

impl Default for BreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: default_failure_threshold(),
            cooldown: Duration::from_millis(default_cooldown_ms()),
            clock: Arc::new(TokioClock),
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: Arc::new(HookRegistry::new()),
        }
    }

    /// Sets the name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the number of consecutive failures that trips the circuit.
    ///
    /// Zero is treated as one.
    pub fn failure_threshold(mut self, count: u32) -> Self {
        self.failure_threshold = count;
        self
    }

    /// Sets the cooldown duration before the circuit transitions from open to half-open.
    pub fn cooldown(mut self, duration: Duration) -> Self {
        self.cooldown = duration;
        self
    }

    /// Sets the time source.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry for the circuit breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hook_registry = Arc::new(hooks);
        self
    }

    /// Builds a new circuit breaker with the configured settings.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.name,
            self.failure_threshold.max(1),
            self.cooldown,
            self.clock,
            self.metric_sink,
            self.hook_registry,
        )
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    name: Option<String>,
    success_statuses: RangeInclusive<u16>,
    transport: Option<Arc<dyn Transport>>,
    breaker: BreakerBuilder,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::from_config(ClientConfig::default())
    }

    /// Creates a builder starting from `config`.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            name: None,
            success_statuses: SUCCESS_STATUSES,
            transport: None,
            breaker: BreakerBuilder::new(),
        }
    }

    /// Sets the base address.
    pub fn base_address(mut self, base_address: impl Into<String>) -> Self {
        self.config.base_address = base_address.into();
        self
    }

    /// Sets the attempt deadline, rounded up to whole milliseconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the consecutive-failure threshold.
    pub fn failure_threshold(mut self, count: u32) -> Self {
        self.config.failure_threshold = count;
        self
    }

    /// Sets the open-state cooldown, rounded up to whole milliseconds.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown_ms = duration_ms(cooldown);
        self
    }

    /// Sets the response body cap.
    pub fn max_response_bytes(mut self, limit: usize) -> Self {
        self.config.max_response_bytes = limit;
        self
    }

    /// Sets the accepted status window. Defaults to `200..=299`.
    pub fn success_statuses(mut self, statuses: RangeInclusive<u16>) -> Self {
        self.success_statuses = statuses;
        self
    }

    /// Sets the breaker name used in logs. Defaults to the base address host.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the transport. Defaults to [`ReqwestTransport`](crate::ReqwestTransport)
    /// when the `reqwest` feature is enabled.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the breaker's time source.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.breaker = self.breaker.clock(clock);
        self
    }

    /// Sets the breaker's metric sink.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.breaker = self.breaker.metric_sink(sink);
        self
    }

    /// Sets the breaker's hook registry.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.breaker = self.breaker.hooks(hooks);
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> ClientResult<Client> {
        self.config.validate()?;
        let base_url = self.config.base_url()?;

        if self.success_statuses.is_empty() {
            return Err(ClientError::InvalidConfig(
                "success status range is empty".to_string(),
            ));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };

        let name = self
            .name
            .or_else(|| base_url.host_str().map(str::to_string))
            .unwrap_or_else(|| "upstream".to_string());

        let breaker = self
            .breaker
            .name(name)
            .failure_threshold(self.config.failure_threshold)
            .cooldown(self.config.cooldown())
            .build();

        let validator = ResponseValidator::new(self.success_statuses, self.config.max_response_bytes);

        Ok(Client::from_parts(
            self.config,
            base_url,
            breaker,
            transport,
            validator,
        ))
    }
}

// Rounds up so a non-zero duration never becomes zero milliseconds.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

#[cfg(feature = "reqwest")]
fn default_transport() -> ClientResult<Arc<dyn Transport>> {
    Ok(Arc::new(crate::transport::ReqwestTransport::new()?))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport() -> ClientResult<Arc<dyn Transport>> {
    Err(ClientError::InvalidConfig(
        "no transport configured; enable the `reqwest` feature or call `transport`".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = ClientConfig::from_json_str(r#"{ "failureThreshold": 3 }"#).unwrap();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.base_address, "http://localhost:8080");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.cooldown(), Duration::from_secs(30));
        assert_eq!(config.max_response_bytes, 1_048_576);
    }

    #[test]
    fn parses_full_surface() {
        let config = ClientConfig::from_json_str(
            r#"{
                "baseAddress": "https://inventory.internal/v1",
                "timeoutMs": 2500,
                "failureThreshold": 3,
                "cooldownMs": 5000,
                "maxResponseBytes": 4096
            }"#,
        )
        .unwrap();

        assert_eq!(config.base_address, "https://inventory.internal/v1");
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.cooldown(), Duration::from_secs(5));
        assert_eq!(config.max_response_bytes, 4096);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ClientConfig::from_json_str(r#"{ "retries": 3 }"#).unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let err = ClientConfig::from_json_str(r#"{ "failureThreshold": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("failureThreshold"));
    }

    #[test]
    fn base_address_must_be_http() {
        let config = ClientConfig {
            base_address: "ftp://files.example".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));

        let config = ClientConfig {
            base_address: "http://localhost:8080/?debug=1".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn breaker_builder_applies_settings() {
        let breaker = BreakerBuilder::new()
            .name("inventory")
            .failure_threshold(0)
            .cooldown(Duration::from_secs(5))
            .build();

        assert_eq!(breaker.name(), "inventory");
        assert_eq!(breaker.failure_threshold(), 1);
        assert_eq!(breaker.cooldown(), Duration::from_secs(5));
    }

    #[test]
    fn sub_millisecond_durations_round_up() {
        let client = ClientBuilder::new()
            .timeout(Duration::from_micros(500))
            .cooldown(Duration::from_micros(1500))
            .transport(crate::testing::ScriptedTransport::new())
            .build()
            .unwrap();

        assert_eq!(client.config().timeout_ms, 1);
        assert_eq!(client.config().cooldown_ms, 2);
        assert_eq!(client.breaker().cooldown(), Duration::from_millis(2));
        assert_eq!(duration_ms(Duration::from_secs(3)), 3000);
    }

    #[test]
    fn empty_status_window_is_rejected() {
        #[allow(clippy::reversed_empty_ranges)]
        let statuses = 300..=200;
        let err = ClientBuilder::new()
            .transport(crate::testing::ScriptedTransport::new())
            .success_statuses(statuses)
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidConfig(_)));
    }
}
