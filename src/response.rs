//! Status, size and decode checks that turn a raw response into a payload.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::ops::RangeInclusive;

use crate::error::{ClientError, ClientResult};
use crate::transport::{BodyStream, RawResponse};

/// Longest body prefix attached to status and decode errors.
pub const BODY_PREFIX_LIMIT: usize = 512;

/// Default accepted status window.
pub const SUCCESS_STATUSES: RangeInclusive<u16> = 200..=299;

/// Validates and decodes responses for one client.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    success_statuses: RangeInclusive<u16>,
    max_response_bytes: usize,
}

impl ResponseValidator {
    /// Creates a validator accepting `success_statuses` and bodies of at most
    /// `max_response_bytes`.
    pub fn new(success_statuses: RangeInclusive<u16>, max_response_bytes: usize) -> Self {
        Self {
            success_statuses,
            max_response_bytes,
        }
    }

    /// The configured body cap.
    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Checks the status and reads the body, stopping as soon as it grows
    /// past the cap.
    pub async fn read_body(&self, raw: RawResponse) -> ClientResult<Bytes> {
        if !self.success_statuses.contains(&raw.status) {
            let body = read_prefix(raw.body).await;
            return Err(ClientError::Status {
                status: raw.status,
                body,
            });
        }

        let limit = self.max_response_bytes;
        if raw.content_length.is_some_and(|len| len > limit as u64) {
            return Err(ClientError::Oversized { limit });
        }

        let mut body = BytesMut::new();
        let mut stream = raw.body;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > limit {
                return Err(ClientError::Oversized { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body.freeze())
    }

    /// Parses a JSON body into `T`.
    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> ClientResult<T> {
        serde_json::from_slice(body).map_err(|source| ClientError::Decode {
            source,
            body: body_prefix(body),
        })
    }
}

/// Lossy UTF-8 rendering of at most [`BODY_PREFIX_LIMIT`] bytes.
pub fn body_prefix(body: &[u8]) -> String {
    let end = body.len().min(BODY_PREFIX_LIMIT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

// Best effort: read errors just end the prefix.
async fn read_prefix(mut stream: BodyStream) -> String {
    let mut prefix = Vec::new();
    while prefix.len() < BODY_PREFIX_LIMIT {
        match stream.next().await {
            Some(Ok(chunk)) => prefix.extend_from_slice(&chunk),
            Some(Err(_)) | None => break,
        }
    }
    body_prefix(&prefix)
}
