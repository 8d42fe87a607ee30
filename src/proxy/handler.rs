//! Per-request orchestration: preflight, rewrite, forward, relay.

use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::proxy::connector::{Connector, TcpConnector};
use crate::proxy::cors;
use crate::proxy::error::{ProxyError, ProxyResult};
use crate::proxy::relay::{self, HeaderPolicy, RelayMode};
use crate::proxy::rewrite::RouteTable;
use crate::proxy::upstream::{UpstreamForwarder, UpstreamTarget};

pub const DEFAULT_DEVICE_NAME: &str = "Limelight 3A";

/// Body of the 500 sent when a streaming route gets nothing to stream.
pub const STREAM_MISSING_MESSAGE: &str = "Failed to get stream from Limelight";

/// Everything a handler needs, fixed at construction.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub target: UpstreamTarget,
    pub mode: RelayMode,
    pub routes: RouteTable,
    pub header_policy: HeaderPolicy,
    /// Name used in failure messages shown to the client.
    pub device_name: String,
}

impl HandlerConfig {
    pub fn new(target: UpstreamTarget, mode: RelayMode) -> Self {
        Self {
            target,
            mode,
            routes: RouteTable::limelight(),
            header_policy: HeaderPolicy::default(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
        }
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }
}

/// Proxies requests for one route to one upstream port.
///
/// Holds only immutable state, so a single instance can serve concurrent
/// requests; each request opens and owns its own upstream connection.
pub struct ProxyHandler<C = TcpConnector> {
    forwarder: UpstreamForwarder<C>,
    mode: RelayMode,
    routes: RouteTable,
    header_policy: HeaderPolicy,
    device_name: String,
}

impl ProxyHandler<TcpConnector> {
    pub fn new(config: HandlerConfig) -> Self {
        Self::with_connector(TcpConnector, config)
    }
}

impl<C: Connector> ProxyHandler<C> {
    pub fn with_connector(connector: C, config: HandlerConfig) -> Self {
        Self {
            forwarder: UpstreamForwarder::new(connector, config.target),
            mode: config.mode,
            routes: config.routes,
            header_policy: config.header_policy,
            device_name: config.device_name,
        }
    }

    pub fn port(&self) -> u16 {
        self.forwarder.target().port
    }

    /// Answer one inbound request. Never fails: every error becomes a 500
    /// carrying CORS headers.
    pub async fn handle(&self, request: Request) -> Response {
        if request.method == Method::OPTIONS {
            return cors::preflight();
        }

        match self.proxy(&request).await {
            Ok(response) => {
                tracing::info!(
                    port = self.port(),
                    method = %request.method,
                    uri = %request.uri(),
                    status = response.status.as_u16(),
                    streamed = response.body.is_streamed(),
                    "Upstream responded"
                );
                response
            }
            Err(e) => {
                tracing::error!(
                    port = self.port(),
                    method = %request.method,
                    uri = %request.uri(),
                    error = %e,
                    "Limelight proxy error"
                );
                self.error_response(&e)
            }
        }
    }

    async fn proxy(&self, request: &Request) -> ProxyResult<Response> {
        let upstream_path = self.routes.rewrite(&request.path);

        tracing::debug!(
            uri = %request.uri(),
            port = self.port(),
            upstream_path = %upstream_path,
            "Proxying request"
        );

        let upstream = self.forwarder.forward(request, &upstream_path).await?;
        relay::relay(upstream, self.mode, &self.header_policy).await
    }

    fn error_response(&self, error: &ProxyError) -> Response {
        let message = match error {
            ProxyError::UpstreamStreamMissing => STREAM_MISSING_MESSAGE.to_string(),
            _ => format!("Failed to connect to {}", self.device_name),
        };

        cors::with_cors(Response::internal_error(message))
    }
}
