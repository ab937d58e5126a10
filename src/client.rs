//! The public client facade.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::breaker::CircuitBreaker;
use crate::config::{ClientBuilder, ClientConfig};
use crate::error::ClientResult;
use crate::invoker::Invoker;
use crate::path;
use crate::response::ResponseValidator;
use crate::state::{BreakerState, FailureKind, Outcome};
use crate::transport::{Transport, TransportRequest};

struct ClientInner {
    config: ClientConfig,
    base_url: Url,
    breaker: CircuitBreaker,
    invoker: Invoker,
    validator: ResponseValidator,
}

/// An HTTP client for one upstream dependency, guarded by its own breaker.
///
/// Cloning is cheap and clones share the breaker.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url.as_str())
            .field("breaker", &self.inner.breaker)
            .finish()
    }
}

impl Client {
    /// Creates a new builder for customizing a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Builds a client from `config` using the default `reqwest` transport.
    #[cfg(feature = "reqwest")]
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        ClientBuilder::from_config(config).build()
    }

    /// Builds a client from `config` using `transport`.
    pub fn with_transport<T: Transport>(config: ClientConfig, transport: T) -> ClientResult<Self> {
        ClientBuilder::from_config(config).transport(transport).build()
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        base_url: Url,
        breaker: CircuitBreaker,
        transport: Arc<dyn Transport>,
        validator: ResponseValidator,
    ) -> Self {
        let invoker = Invoker::new(transport, config.timeout());
        Self {
            inner: Arc::new(ClientInner {
                config,
                base_url,
                breaker,
                invoker,
                validator,
            }),
        }
    }

    /// Fetches `path` and decodes the JSON body into `T`.
    ///
    /// The path is validated before the breaker is consulted; a rejected
    /// call never reaches the transport. Every admitted attempt reports its
    /// outcome exactly once.
    pub async fn perform_request<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.execute(path, None, |validator, body| validator.decode(&body))
            .await
    }

    /// Alias for [`perform_request`](Self::perform_request).
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.perform_request(path).await
    }

    /// Like [`get_json`](Self::get_json), but also aborts when `cancel` fires.
    pub async fn get_json_with_cancel<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<T> {
        self.execute(path, Some(cancel), |validator, body| validator.decode(&body))
            .await
    }

    /// Fetches `path` and returns the validated body without decoding it.
    pub async fn get_bytes(&self, path: &str) -> ClientResult<Bytes> {
        self.execute(path, None, |_, body| Ok(body)).await
    }

    /// Current breaker state.
    pub fn state(&self) -> BreakerState {
        self.inner.breaker.state()
    }

    /// Forces the breaker back to closed with a zero failure tally.
    pub fn reset(&self) {
        self.inner.breaker.reset();
    }

    /// The breaker guarding this client.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The parsed base address.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    async fn execute<T, D>(
        &self,
        path: &str,
        cancel: Option<&CancellationToken>,
        decode: D,
    ) -> ClientResult<T>
    where
        D: FnOnce(&ResponseValidator, Bytes) -> ClientResult<T>,
    {
        let inner = &self.inner;
        let url = path::resolve(&inner.base_url, path)?;
        let permit = inner.breaker.admit()?;

        debug!(
            breaker = %inner.breaker.name(),
            url = %url,
            probe = permit.is_probe(),
            timeout = ?inner.invoker.timeout(),
            "Sending request"
        );

        let validator = &inner.validator;
        let result = inner
            .invoker
            .invoke(TransportRequest { url }, cancel, |raw| validator.read_body(raw))
            .await
            .and_then(|body| decode(validator, body));

        permit.report(outcome_of(&result));
        result
    }
}

fn outcome_of<T>(result: &ClientResult<T>) -> Outcome {
    match result {
        Ok(_) => Outcome::Success,
        Err(err) => Outcome::Failure(err.failure_kind().unwrap_or(FailureKind::Transport)),
    }
}
