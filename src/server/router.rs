//! Prefix dispatch from the host server to the mounted proxy handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::proxy::connector::{Connector, TcpConnector};
use crate::proxy::cors;
use crate::proxy::handler::ProxyHandler;

pub struct Router<C = TcpConnector> {
    mounts: Vec<(String, Arc<ProxyHandler<C>>)>,
}

impl Router<TcpConnector> {
    /// One TCP-backed handler per configured route.
    pub fn from_config(cfg: &Config) -> Self {
        cfg.routes()
            .into_iter()
            .fold(Router::new(), |router, (prefix, handler)| {
                router.mount(prefix, ProxyHandler::new(handler))
            })
    }
}

impl<C: Connector> Router<C> {
    pub fn new() -> Self {
        Self { mounts: Vec::new() }
    }

    /// Mounts are matched in insertion order.
    pub fn mount(mut self, prefix: impl Into<String>, handler: ProxyHandler<C>) -> Self {
        self.mounts.push((prefix.into(), Arc::new(handler)));
        self
    }

    pub fn find(&self, path: &str) -> Option<&ProxyHandler<C>> {
        self.mounts
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, handler)| handler.as_ref())
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        match self.find(&request.path) {
            Some(handler) => handler.handle(request).await,
            None => {
                tracing::debug!(path = %request.path, "No route mounted");
                cors::with_cors(Response::not_found())
            }
        }
    }
}

impl<C: Connector> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}
