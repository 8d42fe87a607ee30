//! Reverse proxy functionality
//!
//! This module implements the Limelight reverse proxy: path rewriting,
//! upstream forwarding, buffered or streamed relaying, and CORS.

pub mod connector;
pub mod cors;
pub mod error;
pub mod handler;
pub mod relay;
pub mod rewrite;
pub mod upstream;

pub use connector::{Connector, TcpConnector};
pub use error::{ProxyError, ProxyResult};
pub use handler::{HandlerConfig, ProxyHandler};
pub use relay::{HeaderPolicy, RelayMode};
pub use rewrite::{RouteRule, RouteTable};
pub use upstream::{UpstreamForwarder, UpstreamTarget};
