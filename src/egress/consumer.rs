//! Response body consumption
//!
//! A final upstream response is either buffered (and hashed) or piped to a
//! caller-supplied sink. Exactly one of the two shapes comes out of a call.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use reqwest::{StatusCode, Url};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::body::GuardedBody;
use super::error::{EgressError, ResponseHead};
use super::timeout::TimeoutController;

/// Caller-supplied destination for streamed bodies
pub type ByteSink<'a> = &'a mut (dyn AsyncWrite + Unpin + Send);

/// Largest up-front allocation made from a declared content length
const MAX_PREALLOCATION: u64 = 1024 * 1024;

/// Final response of an exchange whose body has not been read yet
pub struct UpstreamResponse {
    pub head: ResponseHead,
    /// Number of attempts made, redirects included
    pub attempts: usize,
    response: reqwest::Response,
    controller: TimeoutController,
}

impl UpstreamResponse {
    pub(crate) fn new(
        head: ResponseHead,
        attempts: usize,
        response: reqwest::Response,
        controller: TimeoutController,
    ) -> Self {
        Self {
            head,
            attempts,
            response,
            controller,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Length declared by the upstream, if any
    pub fn content_length(&self) -> Option<u64> {
        self.head
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Wrap the body in timeout and size enforcement
    pub fn into_body(self, size_limit: Option<u64>) -> (ResponseHead, GuardedBody) {
        let stream = Box::pin(self.response.bytes_stream());
        (self.head, GuardedBody::new(stream, self.controller, size_limit))
    }
}

/// Fully buffered response
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Lowercase hex SHA-256 of `body`
    pub sha256: String,
}

/// Response whose body went to a sink
#[derive(Debug, Clone)]
pub struct StreamedResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes_written: u64,
}

/// Outcome of a successful exchange
#[derive(Debug, Clone)]
pub enum ExchangeResult {
    Buffered(BufferedResponse),
    Streamed(StreamedResponse),
}

impl ExchangeResult {
    pub fn status(&self) -> StatusCode {
        match self {
            ExchangeResult::Buffered(r) => r.status,
            ExchangeResult::Streamed(r) => r.status,
        }
    }

    pub fn into_buffered(self) -> Option<BufferedResponse> {
        match self {
            ExchangeResult::Buffered(r) => Some(r),
            ExchangeResult::Streamed(_) => None,
        }
    }
}

/// Reads response bodies under a size ceiling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseConsumer {
    size_limit: Option<u64>,
}

impl ResponseConsumer {
    /// `None` means unbounded
    pub fn new(size_limit: Option<u64>) -> Self {
        Self { size_limit }
    }

    pub fn size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    /// Reject an oversized declared length, then wrap the body
    ///
    /// The declared length is checked before any body byte is read; dropping
    /// the response closes the connection.
    pub fn open(&self, response: UpstreamResponse) -> Result<(ResponseHead, GuardedBody), EgressError> {
        if let (Some(limit), Some(declared)) = (self.size_limit, response.content_length()) {
            if declared > limit {
                return Err(EgressError::TooLarge { limit });
            }
        }
        Ok(response.into_body(self.size_limit))
    }

    /// Buffer and hash the body, or pipe it into `sink`
    pub async fn consume(
        &self,
        response: UpstreamResponse,
        sink: Option<ByteSink<'_>>,
    ) -> Result<ExchangeResult, EgressError> {
        let preallocate = response
            .content_length()
            .unwrap_or(0)
            .min(MAX_PREALLOCATION) as usize;
        let (head, mut body) = self.open(response)?;

        match sink {
            Some(sink) => {
                while let Some(chunk) = body.next().await {
                    let chunk = chunk?;
                    sink.write_all(&chunk).await.map_err(EgressError::Sink)?;
                }
                sink.flush().await.map_err(EgressError::Sink)?;

                Ok(ExchangeResult::Streamed(StreamedResponse {
                    url: head.url,
                    status: head.status,
                    headers: head.headers,
                    bytes_written: body.received(),
                }))
            }
            None => {
                let mut buffer = BytesMut::with_capacity(preallocate);
                let mut hasher = Sha256::new();
                while let Some(chunk) = body.next().await {
                    let chunk = chunk?;
                    hasher.update(&chunk);
                    buffer.extend_from_slice(&chunk);
                }

                Ok(ExchangeResult::Buffered(BufferedResponse {
                    url: head.url,
                    status: head.status,
                    headers: head.headers,
                    body: buffer.freeze(),
                    sha256: hex::encode(hasher.finalize()),
                }))
            }
        }
    }
}

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
