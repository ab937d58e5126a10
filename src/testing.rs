//! An in-memory [`Transport`] for tests and demos.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::TransportError;
use crate::transport::{RawResponse, Transport, TransportRequest};

#[derive(Debug, Clone)]
enum Step {
    Respond { status: u16, body: Bytes },
    Delayed { delay: Duration, status: u16, body: Bytes },
    Fail(String),
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Url>>,
}

/// Replays queued responses in order and counts every call.
///
/// Clones share the same script, so a test can keep a handle after moving a
/// clone into a client. Once the script runs dry each call fails with a
/// transport error.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    /// Creates a transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn respond(&self, status: u16, body: impl Into<Bytes>) -> &Self {
        self.push(Step::Respond {
            status,
            body: body.into(),
        })
    }

    /// Queues a response delivered after `delay`.
    pub fn respond_after(&self, delay: Duration, status: u16, body: impl Into<Bytes>) -> &Self {
        self.push(Step::Delayed {
            delay,
            status,
            body: body.into(),
        })
    }

    /// Queues a transport failure.
    pub fn fail(&self, message: impl Into<String>) -> &Self {
        self.push(Step::Fail(message.into()))
    }

    /// Queues a call that never completes unless cancelled.
    pub fn hang(&self) -> &Self {
        self.push(Step::Hang)
    }

    /// Number of times [`Transport::send`] was invoked.
    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<Url> {
        self.script.requests.lock().clone()
    }

    fn push(&self, step: Step) -> &Self {
        self.script.steps.lock().push_back(step);
        self
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<RawResponse, TransportError>> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        self.script.requests.lock().push(request.url);
        let step = self.script.steps.lock().pop_front();

        async move {
            match step {
                Some(Step::Respond { status, body }) => Ok(RawResponse::from_bytes(status, body)),
                Some(Step::Delayed {
                    delay,
                    status,
                    body,
                }) => {
                    tokio::time::sleep(delay).await;
                    Ok(RawResponse::from_bytes(status, body))
                }
                Some(Step::Fail(message)) => Err(TransportError::new(message)),
                Some(Step::Hang) => {
                    cancel.cancelled().await;
                    Err(TransportError::new("request cancelled"))
                }
                None => Err(TransportError::new("no scripted response")),
            }
        }
        .boxed()
    }
}
