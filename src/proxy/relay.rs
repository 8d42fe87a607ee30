//! Turns an upstream response into the response sent to the client.

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::http::headers::HeaderMap;
use crate::http::response::{Response, ResponseBuilder};
use crate::proxy::cors;
use crate::proxy::error::{ProxyError, ProxyResult};
use crate::proxy::upstream::UpstreamResponse;

/// Whether a route relays its body as it arrives or reads it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Read the whole body, reply with Content-Length.
    Buffered,
    /// Pass bytes through as they arrive, chunked.
    Streamed,
}

impl RelayMode {
    /// Content type used when the upstream sends none.
    pub fn default_content_type(&self) -> &'static str {
        match self {
            RelayMode::Buffered => "application/json",
            RelayMode::Streamed => "application/octet-stream",
        }
    }
}

/// Upstream response headers allowed through to the client, besides
/// Content-Encoding.
pub const DEFAULT_ALLOWED_HEADERS: [&str; 6] = [
    "Cache-Control",
    "Content-Language",
    "ETag",
    "Content-Type",
    "Connection",
    "Transfer-Encoding",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPolicy {
    allowed: Vec<String>,
}

impl HeaderPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Copy allow-listed headers present in `from` into `to`.
    pub fn copy(&self, from: &HeaderMap, to: &mut HeaderMap) {
        for name in &self.allowed {
            if let Some(value) = from.get(name) {
                to.insert(name.as_str(), value);
            }
        }
    }
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HEADERS)
    }
}

/// Build the outbound response for `upstream`.
///
/// Buffered mode reads the body to the end and closes the connection before
/// returning. Streamed mode hands the connection to the response body; a
/// missing body is `UpstreamStreamMissing`.
pub async fn relay<S>(
    upstream: UpstreamResponse<S>,
    mode: RelayMode,
    policy: &HeaderPolicy,
) -> ProxyResult<Response>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let UpstreamResponse {
        status,
        content_type,
        content_encoding,
        headers,
        body,
    } = upstream;

    let content_type = content_type.unwrap_or_else(|| mode.default_content_type().to_string());
    let mut builder = ResponseBuilder::new(status).header("Content-Type", content_type);

    builder = match mode {
        RelayMode::Streamed => {
            let body = body.ok_or(ProxyError::UpstreamStreamMissing)?;
            builder.stream(body.into_stream())
        }
        RelayMode::Buffered => {
            let bytes = match body {
                Some(body) => body.read_to_end().await?,
                None => bytes::Bytes::new(),
            };
            builder.body(bytes)
        }
    };

    let mut response = builder.build();

    if let Some(encoding) = content_encoding {
        response.headers.insert("Content-Encoding", encoding);
    }
    policy.copy(&headers, &mut response.headers);
    cors::apply(&mut response.headers);

    Ok(response)
}
