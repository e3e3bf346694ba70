//! Outbound request description

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};

use super::redirect::DEFAULT_MAX_REDIRECTS;

/// Readable byte stream used as an upload body
pub type RequestStream =
    Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync>>;

/// Body of an outbound request
pub enum RequestBody {
    Empty,
    /// In-memory body; can be replayed on a 307/308 redirect
    Bytes(Bytes),
    /// One-shot stream with an optional known length
    Stream {
        stream: RequestStream,
        length: Option<u64>,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::Stream { length, .. } => write!(f, "Stream(length: {:?})", length),
        }
    }
}

/// One outbound call as requested by a caller
#[derive(Debug)]
pub struct RequestSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// The URL came from a signed value rather than raw caller input
    pub is_trusted_source: bool,
    /// Headers dropped when a redirect leaves the original origin
    pub sensitive_headers: Vec<HeaderName>,
    pub follow_redirect: bool,
    pub max_redirects: usize,
}

impl RequestSpec {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            is_trusted_source: false,
            sensitive_headers: Vec::new(),
            follow_redirect: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merge headers; later values replace earlier ones of the same name
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    pub fn with_stream(mut self, stream: RequestStream, length: Option<u64>) -> Self {
        self.body = RequestBody::Stream { stream, length };
        self
    }

    pub fn trusted(mut self, is_trusted_source: bool) -> Self {
        self.is_trusted_source = is_trusted_source;
        self
    }

    pub fn with_sensitive_header(mut self, name: HeaderName) -> Self {
        if !self.sensitive_headers.contains(&name) {
            self.sensitive_headers.push(name);
        }
        self
    }

    pub fn with_redirects(mut self, follow: bool, max_redirects: usize) -> Self {
        self.follow_redirect = follow;
        self.max_redirects = max_redirects;
        self
    }
}
