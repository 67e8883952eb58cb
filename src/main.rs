use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use inkpost::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "inkpost",
        "Inkpost starting: RUST_LOG='{}', profile={:?}, http_port={}, posts_per_page={}, token_ttl_secs={}, admin={:?}",
        rust_log,
        config.profile,
        config.http_port,
        config.posts_per_page,
        config.token_ttl.as_secs(),
        config.admin_email
    );

    inkpost::server::run(config).await
}
