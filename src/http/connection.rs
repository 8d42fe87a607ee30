use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{parse_http_request, ParseError};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::proxy::connector::Connector;
use crate::proxy::cors;
use crate::server::router::Router;

/// Requests larger than this are rejected instead of buffered.
const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

pub struct Connection<C: Connector> {
    stream: TcpStream,
    buffer: Vec<u8>,
    state: ConnectionState,
    router: Arc<Router<C>>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

enum Incoming {
    Request(Request),
    Malformed(ParseError),
    Eof,
}

impl<C: Connector> Connection<C> {
    pub fn new(stream: TcpStream, router: Arc<Router<C>>) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
            router,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            self.state = match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => match self.read_request().await? {
                    Incoming::Request(req) => ConnectionState::Processing(req),
                    Incoming::Malformed(e) => {
                        tracing::warn!(error = %e, "Rejecting malformed request");
                        let response = cors::with_cors(Response::bad_request());
                        ConnectionState::Writing(ResponseWriter::new(response), false)
                    }
                    Incoming::Eof => ConnectionState::Closed,
                },

                ConnectionState::Processing(req) => {
                    // Unusable framing hides where the next request starts.
                    let keep_alive = req.keep_alive() && req.content_length().is_ok();
                    let head_only = req.method == Method::HEAD;

                    let mut response = self.router.dispatch(req).await;
                    // Connection is hop-by-hop; this side decides it
                    response
                        .headers
                        .insert("Connection", if keep_alive { "keep-alive" } else { "close" });

                    let writer = if head_only {
                        ResponseWriter::head_only(response)
                    } else {
                        ResponseWriter::new(response)
                    };
                    ConnectionState::Writing(writer, keep_alive)
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<Incoming> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    // Remove consumed bytes
                    self.buffer.drain(..consumed);
                    return Ok(Incoming::Request(request));
                }

                Err(ParseError::Incomplete) if self.buffer.len() > MAX_REQUEST_BYTES => {
                    return Ok(Incoming::Malformed(ParseError::InvalidRequest));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => return Ok(Incoming::Malformed(e)),
            }

            // Read more data
            let mut temp = [0u8; 4096];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed connection
                return Ok(Incoming::Eof);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}
