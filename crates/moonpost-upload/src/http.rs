// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport seam between request construction and the network.
//
// `MoonrakerClient` builds fully-formed `HttpRequest`s (URL, headers, body);
// an `HttpTransport` only moves bytes. Tests swap in a scripted transport,
// production uses reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use tracing::{debug, instrument};

use moonpost_core::error::{MoonpostError, Result};

/// Upload progress callback: `(bytes_sent, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Size of the chunks a streamed body is cut into for progress reporting.
const CHUNK_SIZE: usize = 16 * 1024;

/// Time allowed to establish a TCP/TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Request body. The matching `Content-Type` travels in the headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Json(Vec<u8>),
    Multipart(Vec<u8>),
}

impl RequestBody {
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Json(bytes) | Self::Multipart(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fully-built request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Logical operation name used in logs and error messages.
    pub operation: &'static str,
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Whatever the server answered, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text for error messages, lossy on invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests. Exactly one result per request.
///
/// Implementations report only failures to get an answer at all (DNS,
/// refused connection, reset) as errors; HTTP error statuses come back as an
/// `HttpResponse` for the caller to judge.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest, progress: Option<ProgressFn>)
    -> Result<HttpResponse>;
}

/// Production transport on top of `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| MoonpostError::transport("http client setup", e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip_all, fields(operation = request.operation, url = %request.url))]
    async fn send(
        &self,
        request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse> {
        let operation = request.operation;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match (request.body, progress) {
            (RequestBody::Empty, _) => builder,
            (RequestBody::Multipart(bytes), Some(progress)) => {
                let total = bytes.len();
                builder
                    .header(reqwest::header::CONTENT_LENGTH, total)
                    .body(reqwest::Body::wrap_stream(progress_stream(bytes, progress)))
            }
            (RequestBody::Json(bytes) | RequestBody::Multipart(bytes), _) => builder.body(bytes),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| MoonpostError::transport(operation, e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| MoonpostError::transport(operation, e.to_string()))?
            .to_vec();

        debug!(status, bytes = body.len(), "response received");
        Ok(HttpResponse { status, body })
    }
}

/// Cut `bytes` into chunks and report cumulative progress as each chunk is
/// handed to the connection.
fn progress_stream(
    bytes: Vec<u8>,
    progress: ProgressFn,
) -> impl Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let total = bytes.len() as u64;
    let chunks: Vec<Vec<u8>> = bytes.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
    let mut sent = 0u64;
    stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        progress(sent, total);
        Ok(chunk)
    }))
}
