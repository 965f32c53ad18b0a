use clap::Parser;
use codereview_api::Server;
use codereview_core::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "codereview-api", version, about = "Code review agent HTTP service")]
struct Cli {
    /// Directory holding default.toml, {env}.toml and local.toml
    #[arg(long, env = "CODEREVIEW_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Environment profile to layer over the defaults
    #[arg(long = "env", env = "CODEREVIEW_ENV", default_value = "development")]
    environment: String,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.config_dir, &cli.environment)?;
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.logging.filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    settings.log_summary(&cli.config_dir, &cli.environment);

    let server = Server::new(&settings).await?;
    server.run().await
}
