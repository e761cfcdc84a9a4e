use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use kiln_server::{KilnServer, ServerConfig};

/// Kiln reference object store.
#[derive(Parser, Debug)]
#[command(name = "kiln-server", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file).
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Accepted bearer token; repeat for several.
    #[arg(long = "token")]
    tokens: Vec<String>,

    /// Largest accepted upload batch in bytes.
    #[arg(long)]
    max_batch_bytes: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if !cli.tokens.is_empty() {
        config.tokens = cli.tokens;
    }
    if let Some(max) = cli.max_batch_bytes {
        config.max_batch_bytes = max;
    }

    KilnServer::new(config).serve().await?;
    Ok(())
}
