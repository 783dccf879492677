//! HTTP hosting for the edge gate.
//!
//! A thin axum layer: every GET falls through to [`EdgeGate::handle`] over
//! a filesystem object store, and the gate's response is translated into an
//! HTTP response with the security headers applied to verified bodies.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use siteseal_core::config::EdgeConfig;
use siteseal_core::store::FsStore;
use tracing::info;

use crate::gate::{EdgeGate, GateConfig};
use crate::headers::apply_security_headers;

/// Validate configuration, bind, and serve until shutdown.
///
/// # Errors
///
/// Returns an error if configuration validation or the bind fails.
/// Per-request failures are handled inside the gate and never abort the
/// server.
pub async fn run(config: EdgeConfig) -> Result<()> {
    let gate_config =
        GateConfig::from_edge_config(&config).context("edge configuration rejected")?;
    let store = FsStore::new(config.site_root.clone());
    let gate = Arc::new(EdgeGate::new(store, gate_config));

    let app = Router::new()
        .fallback(get(serve_request))
        .with_state(gate);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, root = %config.site_root.display(), "edge gate listening");

    axum::serve(listener, app).await.context("edge server error")?;
    Ok(())
}

async fn serve_request(
    State(gate): State<Arc<EdgeGate<FsStore>>>,
    uri: Uri,
) -> Response {
    let gate_response = gate.handle(uri.path());

    let status =
        StatusCode::from_u16(gate_response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();
    if let Some(path) = &gate_response.object_path {
        apply_security_headers(&mut headers, path);
    }
    (status, headers, gate_response.body).into_response()
}
