//! Upstream connection and request forwarding
//!
//! This module opens one connection per request to the upstream device,
//! writes the forwarded request and parses the response head. The response
//! body stays attached to the connection so the relay can either buffer it
//! or stream it.

use crate::http::headers::HeaderMap;
use crate::http::parser::find_headers_end;
use crate::http::request::{Method, Request};
use crate::http::response::{BodyStream, StatusCode};
use crate::proxy::connector::Connector;
use crate::proxy::error::{ProxyError, ProxyResult};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use url::Url;

/// Default buffer size for reads from the upstream
const BUFFER_SIZE: usize = 8192;

/// Upper bound on the response head and on a single chunk-size line
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Inbound headers that are never copied verbatim. The forwarder writes its
/// own framing and sends one request per connection.
const SKIPPED_REQUEST_HEADERS: [&str; 7] = [
    "Host",
    "Content-Length",
    "Transfer-Encoding",
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "Upgrade",
];

/// Where and how to reach the upstream device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl UpstreamTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(30000),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Absolute URL for an upstream path plus optional query.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> ProxyResult<Url> {
        let mut url = Url::parse(&format!("http://{}:{}{}", self.host, self.port, path))?;
        if query.is_some() {
            url.set_query(query);
        }
        Ok(url)
    }
}

/// Response head from the upstream plus the still-open body.
pub struct UpstreamResponse<S> {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: HeaderMap,
    /// `None` when the response cannot carry a body (HEAD, 1xx, 204, 304).
    pub body: Option<UpstreamBody<S>>,
}

/// Forwards requests to a single upstream target
pub struct UpstreamForwarder<C> {
    connector: C,
    target: UpstreamTarget,
}

impl<C: Connector> UpstreamForwarder<C> {
    pub fn new(connector: C, target: UpstreamTarget) -> Self {
        Self { connector, target }
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    /// Send `request` to the upstream at `upstream_path` and read the
    /// response head.
    ///
    /// The request is fully serialized before connecting, so framing errors
    /// never open a socket. Once connected, the socket is owned by the
    /// returned body or dropped on the error path.
    pub async fn forward(
        &self,
        request: &Request,
        upstream_path: &str,
    ) -> ProxyResult<UpstreamResponse<C::Stream>> {
        let url = self.target.url_for(upstream_path, request.query.as_deref())?;
        let request_bytes = self.build_http_request(request, &url)?;

        let stream = self.connect().await?;

        tracing::trace!(port = self.target.port, "Connected to upstream");

        self.send_request_and_receive_response(stream, &request_bytes, request.method)
            .await
    }

    async fn connect(&self) -> ProxyResult<C::Stream> {
        let addr = format!("{}:{}", self.target.host, self.target.port);

        timeout(
            self.target.connect_timeout,
            self.connector.connect(&self.target.host, self.target.port),
        )
        .await
        .map_err(|_| ProxyError::UpstreamTimeout {
            phase: "connect",
            after: self.target.connect_timeout,
        })?
        .map_err(|source| ProxyError::UpstreamUnreachable { addr, source })
    }

    async fn send_request_and_receive_response(
        &self,
        mut stream: C::Stream,
        request_bytes: &[u8],
        method: Method,
    ) -> ProxyResult<UpstreamResponse<C::Stream>> {
        let write = async {
            stream.write_all(request_bytes).await?;
            stream.flush().await
        };
        timeout(self.target.read_timeout, write)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout {
                phase: "write",
                after: self.target.read_timeout,
            })??;

        tracing::trace!(port = self.target.port, "Request sent to upstream");

        self.read_http_response(stream, method).await
    }

    /// Build HTTP request bytes to send to the upstream
    ///
    /// Note: This method is made public for integration testing purposes
    pub fn build_http_request(&self, request: &Request, url: &Url) -> ProxyResult<Vec<u8>> {
        let mut buffer = Vec::new();

        // Request line
        let target = &url[url::Position::BeforePath..];
        buffer.extend_from_slice(
            format!("{} {} HTTP/1.1\r\n", request.method, target).as_bytes(),
        );

        // Host reflects the upstream, never the client-facing name
        let host = url.host_str().unwrap_or(&self.target.host);
        buffer.extend_from_slice(
            format!("Host: {}:{}\r\n", host, self.target.port).as_bytes(),
        );

        for (key, value) in request.headers.iter() {
            if SKIPPED_REQUEST_HEADERS
                .iter()
                .any(|skipped| skipped.eq_ignore_ascii_case(key))
            {
                continue;
            }
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        let body = if request.method.carries_body() {
            let body = Self::request_body(request)?;
            buffer.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
            body
        } else {
            Bytes::new()
        };

        buffer.extend_from_slice(b"Connection: close\r\n");

        // End of headers
        buffer.extend_from_slice(b"\r\n");

        buffer.extend_from_slice(&body);

        Ok(buffer)
    }

    /// Exactly `Content-Length` bytes of the inbound body.
    ///
    /// A missing Content-Length means an empty body.
    fn request_body(request: &Request) -> ProxyResult<Bytes> {
        let declared = request
            .content_length()
            .map_err(|e| {
                ProxyError::MalformedRequestFraming(format!(
                    "Content-Length {:?}: {}",
                    request.header("Content-Length").unwrap_or_default(),
                    e
                ))
            })?
            .unwrap_or(0);

        if declared > request.body.len() {
            return Err(ProxyError::MalformedRequestFraming(format!(
                "Content-Length {} but only {} body bytes received",
                declared,
                request.body.len()
            )));
        }

        Ok(request.body.slice(..declared))
    }

    /// Read the response head and hand the connection over to the body
    async fn read_http_response(
        &self,
        mut stream: C::Stream,
        method: Method,
    ) -> ProxyResult<UpstreamResponse<C::Stream>> {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        loop {
            if let Some(headers_end) = find_headers_end(&buffer) {
                let head = buffer.split_to(headers_end + 4);
                let (status, headers) = parse_response_headers(&head)?;

                // Interim responses precede the real one
                if status.as_u16() / 100 == 1 && status.as_u16() != 101 {
                    continue;
                }

                let framing = Framing::for_response(method, status, &headers)?;
                let body = framing.map(|framing| UpstreamBody {
                    stream,
                    buffer,
                    framing,
                    read_timeout: self.target.read_timeout,
                });

                return Ok(UpstreamResponse {
                    status,
                    content_type: headers.get("Content-Type").map(str::to_string),
                    content_encoding: headers.get("Content-Encoding").map(str::to_string),
                    headers,
                    body,
                });
            }

            // Prevent unbounded header growth
            if buffer.len() > MAX_HEAD_SIZE {
                return Err(ProxyError::protocol("response headers too large"));
            }

            buffer.reserve(BUFFER_SIZE);
            let n = timeout(self.target.read_timeout, stream.read_buf(&mut buffer))
                .await
                .map_err(|_| ProxyError::UpstreamTimeout {
                    phase: "read",
                    after: self.target.read_timeout,
                })??;

            if n == 0 {
                return Err(ProxyError::protocol(
                    "connection closed before complete response received",
                ));
            }
        }
    }
}

/// Parse a response head (status line and headers)
pub fn parse_response_headers(head: &[u8]) -> ProxyResult<(StatusCode, HeaderMap)> {
    let head = std::str::from_utf8(head)
        .map_err(|_| ProxyError::protocol("invalid UTF-8 in response headers"))?;

    let mut lines = head.split("\r\n");

    let status_line = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| ProxyError::protocol("empty response"))?;
    let mut parts = status_line.splitn(3, ' ');

    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(ProxyError::protocol(format!(
            "invalid status line: {}",
            status_line
        )));
    }

    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(StatusCode::from_u16)
        .ok_or_else(|| ProxyError::protocol(format!("invalid status code: {}", status_line)))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim(), value.trim());
        }
    }

    Ok((status, headers))
}

/// How the upstream delimits its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(u64),
    Chunked(ChunkState),
    UntilClose,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
}

impl Framing {
    /// `None` when the response has no body at all.
    fn for_response(
        method: Method,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> ProxyResult<Option<Self>> {
        if method == Method::HEAD || status.forbids_body() {
            return Ok(None);
        }

        let chunked = headers
            .get("Transfer-Encoding")
            .and_then(|te| te.rsplit(',').next())
            .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"));
        if chunked {
            return Ok(Some(Framing::Chunked(ChunkState::Size)));
        }

        match headers.get("Content-Length") {
            Some(cl) => cl
                .trim()
                .parse::<u64>()
                .map(|n| Some(Framing::Length(n)))
                .map_err(|_| ProxyError::protocol(format!("invalid Content-Length: {}", cl))),
            None => Ok(Some(Framing::UntilClose)),
        }
    }
}

/// Response body still attached to its upstream connection.
///
/// Dropping the body closes the connection.
pub struct UpstreamBody<S> {
    stream: S,
    buffer: BytesMut,
    framing: Framing,
    read_timeout: Duration,
}

impl<S> UpstreamBody<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Next piece of decoded body, `None` at the end.
    pub async fn next_chunk(&mut self) -> ProxyResult<Option<Bytes>> {
        loop {
            match self.framing {
                Framing::Done => return Ok(None),

                Framing::Length(0) => self.framing = Framing::Done,
                Framing::Length(remaining) => {
                    let chunk = self.take_up_to(remaining).await?;
                    self.framing = Framing::Length(remaining - chunk.len() as u64);
                    return Ok(Some(chunk));
                }

                Framing::UntilClose => {
                    if self.buffer.is_empty() && self.fill().await? == 0 {
                        self.framing = Framing::Done;
                        continue;
                    }
                    return Ok(Some(self.buffer.split().freeze()));
                }

                Framing::Chunked(ChunkState::Size) => {
                    let line = self.read_line().await?;
                    let size = line.split(';').next().unwrap_or_default().trim();
                    let size = u64::from_str_radix(size, 16).map_err(|_| {
                        ProxyError::protocol(format!("invalid chunk size: {:?}", line))
                    })?;
                    self.framing = if size == 0 {
                        Framing::Chunked(ChunkState::Trailers)
                    } else {
                        Framing::Chunked(ChunkState::Data(size))
                    };
                }
                Framing::Chunked(ChunkState::Data(remaining)) => {
                    let chunk = self.take_up_to(remaining).await?;
                    let left = remaining - chunk.len() as u64;
                    self.framing = if left == 0 {
                        Framing::Chunked(ChunkState::DataEnd)
                    } else {
                        Framing::Chunked(ChunkState::Data(left))
                    };
                    return Ok(Some(chunk));
                }
                Framing::Chunked(ChunkState::DataEnd) => {
                    if !self.read_line().await?.is_empty() {
                        return Err(ProxyError::protocol("missing CRLF after chunk"));
                    }
                    self.framing = Framing::Chunked(ChunkState::Size);
                }
                Framing::Chunked(ChunkState::Trailers) => {
                    if self.read_line().await?.is_empty() {
                        self.framing = Framing::Done;
                    }
                }
            }
        }
    }

    /// Read the whole body, then close the connection.
    pub async fn read_to_end(mut self) -> ProxyResult<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        self.close().await;
        Ok(body.freeze())
    }

    /// Lazy body stream that owns the connection.
    ///
    /// The connection is closed when the stream ends, fails, or is dropped.
    pub fn into_stream(self) -> BodyStream {
        Box::pin(futures_util::stream::try_unfold(self, |mut body| async move {
            match body.next_chunk().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => {
                    body.close().await;
                    Ok(None)
                }
                Err(e) => Err(e.into_io()),
            }
        }))
    }

    /// Shut down and drop the upstream connection.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            tracing::trace!(error = %e, "Upstream shutdown failed");
        }
    }

    async fn take_up_to(&mut self, remaining: u64) -> ProxyResult<Bytes> {
        if self.buffer.is_empty() && self.fill().await? == 0 {
            return Err(ProxyError::protocol(format!(
                "connection closed with {} body bytes outstanding",
                remaining
            )));
        }
        let take = self.buffer.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        Ok(self.buffer.split_to(take).freeze())
    }

    async fn read_line(&mut self) -> ProxyResult<String> {
        loop {
            if let Some(pos) = self.buffer.windows(2).position(|w| w == b"\r\n") {
                let line = self.buffer.split_to(pos + 2);
                return String::from_utf8(line[..pos].to_vec())
                    .map_err(|_| ProxyError::protocol("invalid UTF-8 in chunk framing"));
            }
            if self.buffer.len() > MAX_HEAD_SIZE {
                return Err(ProxyError::protocol("chunk framing line too long"));
            }
            if self.fill().await? == 0 {
                return Err(ProxyError::protocol("connection closed inside chunk framing"));
            }
        }
    }

    async fn fill(&mut self) -> ProxyResult<usize> {
        self.buffer.reserve(BUFFER_SIZE);
        let n = timeout(self.read_timeout, self.stream.read_buf(&mut self.buffer))
            .await
            .map_err(|_| ProxyError::UpstreamTimeout {
                phase: "read",
                after: self.read_timeout,
            })??;
        Ok(n)
    }
}
