//! Failure taxonomy for a single proxied request.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Connect failure or unresolvable host.
    #[error("upstream {addr} unreachable: {source}")]
    UpstreamUnreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connect or read deadline elapsed.
    #[error("upstream {phase} timed out after {after:?}")]
    UpstreamTimeout { phase: &'static str, after: Duration },

    /// Streaming route received a response without a body.
    #[error("upstream returned no body to stream")]
    UpstreamStreamMissing,

    /// Inbound Content-Length unusable for a body-bearing method.
    #[error("malformed request framing: {0}")]
    MalformedRequestFraming(String),

    /// Upstream spoke something other than HTTP/1.x.
    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        ProxyError::UpstreamProtocol(msg.into())
    }

    /// Maps a proxy error onto `std::io::Error` for streamed bodies.
    pub(crate) fn into_io(self) -> std::io::Error {
        match self {
            ProxyError::Io(e) => e,
            ProxyError::UpstreamTimeout { .. } => {
                std::io::Error::new(std::io::ErrorKind::TimedOut, self)
            }
            other => std::io::Error::other(other),
        }
    }
}
