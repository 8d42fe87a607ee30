use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::http::connection::Connection;
use crate::proxy::connector::Connector;
use crate::server::router::Router;

pub async fn run<C: Connector>(listen_addr: &str, router: Arc<Router<C>>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding {}", listen_addr))?;
    info!("Listening on {}", listen_addr);

    serve(listener, router).await
}

/// Accept loop over an already bound listener.
pub async fn serve<C: Connector>(listener: TcpListener, router: Arc<Router<C>>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!("Accepted connection from {}", peer);

        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, router);
            if let Err(e) = conn.run().await {
                tracing::warn!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
