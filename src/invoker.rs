//! Deadline-bounded execution of one transport attempt.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::transport::{RawResponse, Transport, TransportRequest};

/// Runs one attempt against a [`Transport`] under a hard deadline.
#[derive(Clone)]
pub(crate) struct Invoker {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Invoker {
    pub(crate) fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `request` and feeds the raw response to `read`, all under one
    /// deadline.
    ///
    /// Whichever fires first wins: completion, the deadline, or the caller's
    /// token. On the latter two the in-flight future is dropped and the
    /// attempt's token is cancelled. The timer is dropped with the `select!`,
    /// so nothing outlives the call.
    pub(crate) async fn invoke<T, F, Fut>(
        &self,
        request: TransportRequest,
        caller: Option<&CancellationToken>,
        read: F,
    ) -> ClientResult<T>
    where
        F: FnOnce(RawResponse) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let token = caller
            .map(CancellationToken::child_token)
            .unwrap_or_default();

        let attempt = async {
            let raw = self.transport.send(request, token.clone()).await?;
            read(raw).await
        };

        tokio::select! {
            biased;
            result = attempt => match result {
                // Token-aware transports bail out with their own error once the
                // caller cancels; the deadline arm has not run at this point.
                Err(ClientError::Transport(_)) if token.is_cancelled() => {
                    debug!("Attempt cancelled by caller");
                    Err(ClientError::Cancelled)
                }
                other => other,
            },
            _ = tokio::time::sleep(self.timeout) => {
                token.cancel();
                debug!(timeout = ?self.timeout, "Attempt exceeded its deadline");
                Err(ClientError::Timeout { after: self.timeout })
            }
            _ = token.cancelled() => {
                debug!("Attempt cancelled by caller");
                Err(ClientError::Cancelled)
            }
        }
    }
}
