//! HTTP surface — a thin adapter around the assertion protocol.
//!
//! The server holds no per-request state: each `/auth` hit extracts the
//! forwarded TLS attributes, signs them, and responds. The only shared state
//! is the signer itself.

pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::Result;
use crate::assertion::Signer;
use crate::config::Config;

/// Shared state for the proxy handlers.
pub struct ProxyState {
    /// Signs assertions with the proxy's private key.
    pub signer: Signer,
}

/// Build the full application router.
pub fn router(state: Arc<ProxyState>) -> Router {
    handlers::routes(state).layer(TraceLayer::new_for_http())
}

/// Bind the configured listener and serve until the process is stopped.
pub async fn serve(config: &Config, signer: Signer) -> Result<()> {
    let state = Arc::new(ProxyState { signer });
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, base_uri = %config.proxy.base_uri, "Certificate authentication proxy listening");

    axum::serve(listener, app).await?;
    Ok(())
}
