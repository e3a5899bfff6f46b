use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sockschain::config::{Chain, Config};
use sockschain::server::Server;
use sockschain::upstream::TunnelEndpoint;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "SOCKS4/SOCKS5 gateway forwarding through a fixed upstream tunnel")]
struct Args {
    /// JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Fail instead of writing a default config when the file is missing
    #[arg(long)]
    no_create: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_default: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    if args.print_default {
        println!("{}", Config::default().to_json()?);
        return Ok(());
    }

    let config = Config::load_or_create(&args.config, !args.no_create)
        .with_context(|| format!("failed to read config '{}'", args.config.display()))?;

    let dialer = Arc::new(TunnelEndpoint::from(&config.tunnel));
    let chains: Arc<[Chain]> = config.chains.clone().into();
    let idle_timeout = config.idle_timeout();

    tracing::info!("tunnel endpoint is {dialer}");

    let mut servers = JoinSet::new();
    for endpoint in config.listeners {
        let server = Server::new(endpoint, Arc::clone(&chains), Arc::clone(&dialer), idle_timeout);
        servers.spawn(server.run());
    }

    while let Some(joined) = servers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("listener task failed: {e}");
        }
    }

    Ok(())
}
