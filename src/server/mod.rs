//!
//! portal session HTTP server
//! --------------------------
//! Axum router exposing the `/auth/me` user context contract plus a liveness probe.
//! User records come from a `UserStore`; the bundled binary uses the in-memory
//! store, optionally seeded from `PORTAL_USERS_FILE`.

pub mod auth_me;
pub mod user_store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::config::ServerConfig;
use user_store::{InMemoryUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn UserStore>, config: ServerConfig) -> Self {
        Self { store, config: Arc::new(config) }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/me", get(auth_me::auth_me).head(auth_me::method_not_allowed).fallback(auth_me::method_not_allowed))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Bind on `0.0.0.0:<http_port>` and serve until the process exits.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = match &config.users_file {
        Some(path) => {
            let store = InMemoryUserStore::load_json_file(path)?;
            info!(target: "portal::server", "loaded {} users from {}", store.len(), path);
            store
        }
        None => {
            info!(target: "portal::server", "no PORTAL_USERS_FILE set; starting with an empty user store");
            InMemoryUserStore::new()
        }
    };
    if config.verifier.is_none() {
        tracing::warn!(target: "portal::server", "bearer token signatures are NOT verified; set PORTAL_JWT_HS256_SECRET in production");
    }

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = build_router(AppState::new(Arc::new(store), config));
    info!(target: "portal::server", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
