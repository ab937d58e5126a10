//! The transport seam: the single outbound operation the client depends on.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::fmt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::TransportError;

/// A response body delivered chunk by chunk.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// One outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// Fully resolved target.
    pub url: Url,
}

/// A response as delivered by the transport, before any validation.
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Declared body length, if the transport knows it.
    pub content_length: Option<u64>,
    /// The body, read lazily.
    pub body: BodyStream,
}

impl RawResponse {
    /// Builds a response whose body is already in memory.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            content_length: Some(body.len() as u64),
            body: Box::pin(futures::stream::once(async move { Ok(body) })),
        }
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Performs a single outbound exchange.
///
/// Implementations must not retry. The client drops the returned future when
/// the deadline expires, and cancels `cancel` for transports that hand work
/// off to other tasks.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and resolves once response headers are available.
    fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<RawResponse, TransportError>>;
}

#[cfg(feature = "reqwest")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use futures::{FutureExt, StreamExt};
    use tokio_util::sync::CancellationToken;

    use super::{BoxFuture, RawResponse, Transport, TransportRequest};
    use crate::error::{ClientError, TransportError};

    /// [`Transport`] backed by a shared `reqwest::Client`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        /// Creates a transport with a default `reqwest` client.
        ///
        /// The client carries no timeout of its own; the deadline is enforced
        /// by the caller.
        pub fn new() -> Result<Self, ClientError> {
            let client = reqwest::Client::builder().build().map_err(|e| {
                ClientError::InvalidConfig(format!("failed to create HTTP client: {}", e))
            })?;
            Ok(Self { client })
        }

        /// Wraps an existing `reqwest` client.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl Transport for ReqwestTransport {
        fn send(
            &self,
            request: TransportRequest,
            cancel: CancellationToken,
        ) -> BoxFuture<'_, Result<RawResponse, TransportError>> {
            async move {
                let response = tokio::select! {
                    response = self.client.get(request.url).send() => response
                        .map_err(|e| TransportError::with_source("request failed", e))?,
                    _ = cancel.cancelled() => {
                        return Err(TransportError::new("request cancelled"));
                    }
                };

                let status = response.status().as_u16();
                let content_length = response.content_length();
                let body = futures::stream::unfold(Some(response), |state| async move {
                    let mut response = state?;
                    match response.chunk().await {
                        Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                        Ok(None) => None,
                        Err(e) => Some((
                            Err(TransportError::with_source(
                                "failed to read response body",
                                e,
                            )),
                            None,
                        )),
                    }
                })
                .boxed();

                Ok(RawResponse {
                    status,
                    content_length,
                    body,
                })
            }
            .boxed()
        }
    }
}
