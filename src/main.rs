use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use portal_session::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "portal",
        "portal-session starting: RUST_LOG='{}', http_port={}, allowed_domains={:?}, default_role='{}', verify_signatures={}, users_file={:?}",
        rust_log,
        config.http_port,
        config.allowed_domains,
        config.default_role,
        config.verifier.is_some(),
        config.users_file
    );

    portal_session::server::run(config).await
}
