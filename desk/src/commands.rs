//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use ratedesk_client::{LoggingEvents, RateClientConfig, RateSourceClient};
use ratedesk_common::Direction;
use ratedesk_pricing::{
    DraftUpdate, OrderPricingController, PairSelector, PricingConfig, RateMode, StaticTranslator,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Pair to mark active (defaults to the first catalog pair)
    #[arg(short, long)]
    pair: Option<String>,

    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    duration: u64,
}

#[derive(Args, Debug)]
pub struct PriceArgs {
    /// Currency pair, e.g. RUB/USD
    #[arg(short, long)]
    pair: String,

    /// BUY or SELL
    #[arg(short, long, default_value = "BUY")]
    direction: Direction,

    /// Order amount; spaces and thousands separators are accepted
    #[arg(short, long)]
    amount: String,

    /// Rate source for dynamic pricing
    #[arg(short, long)]
    source: Option<String>,

    /// Manual rate; switches the draft to fixed mode
    #[arg(long)]
    fixed_rate: Option<String>,

    /// Signed adjustment in percent
    #[arg(long)]
    adjustment: Option<Decimal>,

    /// Service fee in percent (overrides PRICING_SERVICE_FEE_PERCENT)
    #[arg(long)]
    service_fee: Option<Decimal>,

    /// Settlement city for cash pairs
    #[arg(long)]
    city: Option<String>,
}

#[derive(Args, Debug)]
pub struct SetRateArgs {
    /// Currency pair, e.g. RUB/USD
    #[arg(short, long)]
    pair: String,

    /// Rate source code
    #[arg(short, long)]
    source: String,

    /// New rate
    #[arg(short, long)]
    rate: Decimal,
}

fn build_client(config: RateClientConfig) -> anyhow::Result<Arc<RateSourceClient>> {
    let client = RateSourceClient::builder()
        .config(config)
        .translator(Arc::new(StaticTranslator::english()))
        .events(Arc::new(LoggingEvents))
        .build()?;
    Ok(Arc::new(client))
}

/// Load the catalog and all rates, then follow the push channel.
pub async fn watch(config: RateClientConfig, args: WatchArgs) -> anyhow::Result<()> {
    let client = build_client(config)?;

    if let Err(e) = client.load_catalog().await {
        warn!(error = %e, "Catalog unavailable");
    }
    let populated = client.load_all_rates().await?;
    info!(pairs = populated, "Initial rates loaded");

    if let Some(pair) = &args.pair {
        client.select_pair(pair);
    }

    let mut state = client.subscribe()?;
    let deadline = async {
        if args.duration > 0 {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = &mut deadline => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                info!(state = %current, "Push channel state");
            }
        }
    }

    client.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&client.store().table())?);
    Ok(())
}

/// Price one draft and print the summary as JSON.
pub async fn price(config: RateClientConfig, args: PriceArgs) -> anyhow::Result<()> {
    let pricing = PricingConfig::from_env();
    if let Err(e) = pricing.validate() {
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let client = build_client(config)?;
    client.load_rates_for_pair(&args.pair).await?;

    let controller = OrderPricingController::builder(client.store())
        .config(pricing)
        .pair_selector(client.clone() as Arc<dyn PairSelector>)
        .translator(Arc::new(StaticTranslator::english()))
        .build();

    controller.update_field(DraftUpdate::AutoCalculate(false));
    controller.update_field(DraftUpdate::Pair(args.pair.clone()));
    controller.update_field(DraftUpdate::Direction(args.direction));
    controller.update_field(DraftUpdate::Amount(args.amount));
    if let Some(source) = args.source {
        controller.update_field(DraftUpdate::Source(source));
    }
    if let Some(rate) = args.fixed_rate {
        controller.update_field(DraftUpdate::RateMode(RateMode::Fixed));
        controller.update_field(DraftUpdate::FixedRate(rate));
    }
    if let Some(adjustment) = args.adjustment {
        controller.update_field(DraftUpdate::Adjustment(adjustment));
    }
    if let Some(fee) = args.service_fee {
        controller.update_field(DraftUpdate::ServiceFee(fee));
    }
    if args.city.is_some() {
        controller.update_field(DraftUpdate::City(args.city));
    }

    let result = controller.calculate();
    controller.shutdown();
    client.shutdown().await;

    let summary = result?;
    if let Err(e) = controller.validate_submission() {
        warn!(reason = %e, "Order would not be accepted");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Write an admin rate and echo the acknowledgement.
pub async fn set_rate(config: RateClientConfig, args: SetRateArgs) -> anyhow::Result<()> {
    let client = build_client(config)?;
    let ack = client.set_rate(&args.pair, &args.source, args.rate).await?;
    client.shutdown().await;

    info!(pair = %args.pair, source = %args.source, rate = %args.rate, "Rate accepted");
    if let Some(message) = ack.message {
        println!("{message}");
    }
    Ok(())
}
