//! RateDesk CLI
//!
//! Drives the rate client and the pricing controller against a live rate
//! service.

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{PriceArgs, SetRateArgs, WatchArgs};

/// RateDesk command-line front end
#[derive(Parser, Debug)]
#[command(name = "ratedesk")]
#[command(about = "Live exchange rates and order pricing")]
struct Args {
    /// Rate service base URL (overrides RATES_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Push channel base URL (overrides RATES_PUSH_URL)
    #[arg(long, global = true)]
    push_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream live rates until interrupted
    Watch(WatchArgs),
    /// Price an order draft against current rates
    Price(PriceArgs),
    /// Write one source's rate on the server
    SetRate(SetRateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let json_layer = args.json.then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!args.json).then(|| tracing_subscriber::fmt::layer());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(json_layer)
        .with(text_layer)
        .init();

    let mut config = ratedesk_client::RateClientConfig::from_env();
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(url) = args.push_url {
        config.push_url = Some(url);
    }
    if let Err(e) = config.validate() {
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    info!(api_url = %config.api_url, "Starting RateDesk");

    match args.command {
        Command::Watch(watch) => commands::watch(config, watch).await,
        Command::Price(price) => commands::price(config, price).await,
        Command::SetRate(set_rate) => commands::set_rate(config, set_rate).await,
    }
}
