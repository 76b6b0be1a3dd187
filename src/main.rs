//! AutoTrade - Main Entry Point

use anyhow::{Context, Result};
use autotrade::config::{Config, PriceSourceKind, PricingConfig};
use autotrade::dispatch::{ActionDispatcher, HttpBrokerConnector};
use autotrade::pricing::{PriceFeed, PriceSource, QuoteClient, StreamClient};
use autotrade::runtime::Shutdown;
use autotrade::strategy::{StrategyEvaluator, StrategyRequest, StrategyStore};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// AutoTrade CLI
#[derive(Parser)]
#[command(name = "autotrade")]
#[command(version, about = "Price-triggered trading strategies with broker dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the price feed, strategy evaluator and dispatcher until Ctrl-C (default)
    Run,

    /// Fetch the current quote for one ticker and exit
    Quote {
        /// Ticker symbol, e.g. AAPL
        ticker: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Quote { ticker } => show_quote(&config.pricing, &ticker).await,
        Commands::Run => run(config).await,
    }
}

async fn run(config: Config) -> Result<()> {
    info!("AutoTrade v{} starting", env!("CARGO_PKG_VERSION"));
    log_config(&config);

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let feed = Arc::new(PriceFeed::from_config(&config.pricing));
    let source = build_price_source(&config.pricing)?;
    let store = Arc::new(StrategyStore::new(feed.clone()));

    let connector = Arc::new(HttpBrokerConnector::new(&config.broker)?);
    let dispatcher = Arc::new(ActionDispatcher::new(
        connector,
        config.broker.exchange.clone(),
        config.broker.recovery_interval(),
    ));
    let evaluator = StrategyEvaluator::new(
        store.clone(),
        feed.clone(),
        dispatcher.clone(),
        config.evaluator.tick_interval(),
    );

    let feed_task = {
        let feed = feed.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { feed.run(source, &shutdown).await })
    };

    let evaluator_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { evaluator.run(&shutdown).await })
    };

    let dispatcher_task = {
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { dispatcher.run(&shutdown).await })
    };

    let seed_task = {
        let shutdown = shutdown.clone();
        let strategies = config.strategies.clone();
        tokio::spawn(async move { seed_strategies(&store, &feed, strategies, &shutdown).await })
    };

    let (feed_result, evaluator_result, dispatcher_result, seed_result) =
        tokio::join!(feed_task, evaluator_task, dispatcher_task, seed_task);

    for (task, result) in [
        ("price feed", feed_result),
        ("strategy evaluator", evaluator_result),
        ("trade action dispatcher", dispatcher_result),
        ("strategy seeding", seed_result),
    ] {
        if let Err(e) = result {
            error!(task, error = %e, "Task terminated abnormally");
        }
    }

    info!("AutoTrade shutdown complete");
    Ok(())
}

fn build_price_source(config: &PricingConfig) -> Result<PriceSource> {
    let source = match config.source {
        PriceSourceKind::Polling => PriceSource::Polling(Arc::new(QuoteClient::new(config)?)),
        PriceSourceKind::Streaming => PriceSource::Streaming(Arc::new(StreamClient::new(config))),
    };
    Ok(source)
}

/// Register configured strategies once the first prices are in.
async fn seed_strategies(
    store: &StrategyStore,
    feed: &PriceFeed,
    strategies: Vec<StrategyRequest>,
    shutdown: &Shutdown,
) {
    if strategies.is_empty() {
        return;
    }

    if feed.wait_until_warm(shutdown).await.is_err() {
        return;
    }

    let total = strategies.len();
    // Rejections are logged by the store.
    let added = strategies
        .iter()
        .filter(|request| store.add_strategy(request).is_ok())
        .count();

    if added < total {
        warn!(added, total, "Some configured strategies were rejected");
    } else {
        info!(added, "Configured strategies registered");
    }
}

/// Print the current quote for `ticker`.
async fn show_quote(config: &PricingConfig, ticker: &str) -> Result<()> {
    let client = QuoteClient::new(config)?;
    let ticker = ticker.to_uppercase();

    let quote = client
        .get_quote(&ticker)
        .await
        .with_context(|| format!("Failed to fetch quote for {}", ticker))?;

    if quote.current_price.is_zero() {
        println!("{}: no quote available", ticker);
    } else {
        println!("{}: {}", ticker, quote.current_price);
        if let Some(previous_close) = quote.previous_close {
            println!("   Previous close: {}", previous_close);
        }
    }

    Ok(())
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "autotrade.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer guard alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("autotrade=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("Configuration:");
    info!(
        "   Price source: {:?} ({} tickers: {})",
        config.pricing.source,
        config.pricing.tickers.len(),
        config.pricing.tickers.join(", ")
    );
    match config.pricing.source {
        PriceSourceKind::Polling => info!(
            "   Quote API: {} every {}s",
            config.pricing.quote_url, config.pricing.poll_interval_secs
        ),
        PriceSourceKind::Streaming => info!("   Trade stream: {}", config.pricing.stream_url),
    }
    if config.pricing.api_token.is_empty() {
        warn!("   No pricing API token configured");
    }
    info!("   Feed recovery interval: {}s", config.pricing.recovery_interval_secs);
    info!("   Evaluation interval: {}ms", config.evaluator.tick_interval_ms);
    info!(
        "   Broker: {} vhost '{}' exchange '{}'",
        config.broker.url, config.broker.vhost, config.broker.exchange
    );
    info!("   Broker recovery interval: {}s", config.broker.recovery_interval_secs);
    if !config.strategies.is_empty() {
        info!("   Configured strategies: {}", config.strategies.len());
    }
}
