use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::{Body, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Headers whose value is dictated by the body variant.
const FRAMING_HEADERS: [&str; 2] = ["Content-Length", "Transfer-Encoding"];

fn serialize_head(resp: &Response, head_only: bool) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in resp.headers.iter() {
        if FRAMING_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(k)) {
            continue;
        }
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Framing
    if !resp.status.forbids_body() {
        match &resp.body {
            Body::Buffered(bytes) => {
                buf.extend_from_slice(format!("Content-Length: {}\r\n", bytes.len()).as_bytes());
            }
            Body::Streamed(_) if !head_only => {
                buf.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
            }
            Body::Streamed(_) => {}
        }
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Writes one response, choosing Content-Length or chunked framing from the
/// body variant.
pub struct ResponseWriter {
    head: Vec<u8>,
    body: Option<Body>,
}

impl ResponseWriter {
    pub fn new(response: Response) -> Self {
        Self::build(response, false)
    }

    /// Writer for a HEAD request: headers only, body dropped unread.
    pub fn head_only(response: Response) -> Self {
        Self::build(response, true)
    }

    fn build(response: Response, head_only: bool) -> Self {
        let head = serialize_head(&response, head_only);
        let body = if head_only || response.status.forbids_body() {
            None
        } else {
            Some(response.body)
        };

        Self { head, body }
    }

    /// Writes the response and returns the number of body bytes sent.
    ///
    /// A streamed body is dropped as soon as writing fails, which releases the
    /// upstream connection behind it.
    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        stream.write_all(&self.head).await?;

        let sent = match self.body.take() {
            None => 0,
            Some(Body::Buffered(bytes)) => {
                stream.write_all(&bytes).await?;
                bytes.len() as u64
            }
            Some(Body::Streamed(mut chunks)) => {
                let mut sent = 0u64;
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    if chunk.is_empty() {
                        continue;
                    }
                    stream
                        .write_all(format!("{:X}\r\n", chunk.len()).as_bytes())
                        .await?;
                    stream.write_all(&chunk).await?;
                    stream.write_all(b"\r\n").await?;
                    // Keep live media moving instead of sitting in buffers.
                    stream.flush().await?;
                    sent += chunk.len() as u64;
                }
                stream.write_all(b"0\r\n\r\n").await?;
                sent
            }
        };

        stream.flush().await?;
        Ok(sent)
    }
}
