use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zkbo_backend::{serve, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,zkbo=debug".into()))
        .with(fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;
    tracing::info!(
        "starting zkbo-backend {} on {} ({} network)",
        zkbo_common::VERSION,
        config.listen_addr,
        config.pipeline.network
    );
    serve(config).await
}
