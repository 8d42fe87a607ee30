//! HTTP/1.1 plumbing for the host side of the proxy.
//!
//! Inbound requests are parsed from a per-connection buffer, dispatched to
//! the mounted Limelight handler, and written back with Content-Length or
//! chunked framing depending on whether the body was buffered or streamed.
//!
//! Each client connection cycles through:
//!
//! ```text
//!   Reading ──request──▶ Processing ──response──▶ Writing
//!      ▲                                            │
//!      └──────────────── keep-alive ────────────────┤
//!                                                   └── close ──▶ Closed
//! ```
//!
//! A request that fails to parse is answered with 400 and the connection is
//! closed, since the start of the next request can no longer be found.

pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
