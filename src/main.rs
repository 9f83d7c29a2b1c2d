use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use log::info;
use tokio::time::sleep;

use jurisprudence_collector::{
    collector::Collector,
    config::Config,
    control::ControlPlane,
    fetcher::{self, RateLimitedFetcher},
    metrics::METRICS,
    scheduler::JobScheduler,
    sources::{build_registry, extract::HtmlExtractor},
    store,
};

const DEFAULT_CONFIG: &str = "config.json";
const CONFIG_ENV: &str = "JURIS_CONFIG";

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Initialize cryptography backend (rustls)
// - Load configuration and logging
// - Build store, source registry, collector and scheduler
// - Either run one collection (`--once`) or keep the daily job
//   running until Ctrl-C
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --------------------------------------------------------
    // IMPORTANT:
    // rustls >= 0.23 requires an explicit CryptoProvider.
    // Must run before the first HTTPS request.
    // --------------------------------------------------------
    fetcher::install_crypto_provider();

    let args = CliArgs::parse(env::args().skip(1))?;

    let config = Config::load(&args.config_path)
        .with_context(|| format!("loading configuration from {}", args.config_path))?;

    init_logging(config.debug_log());
    info!("configuration loaded from {}", args.config_path);

    // --------------------------------------------------------
    // Wiring
    // --------------------------------------------------------
    let store = store::open(&config.store)
        .await
        .context("opening record store")?;

    let client = RateLimitedFetcher::build_client(&config.fetcher)?;
    let fetcher = RateLimitedFetcher::from_config(client, &config.fetcher);

    let tz = config.schedule.timezone()?;
    let registry = build_registry(
        &config.enabled_sources(),
        &fetcher,
        Arc::new(HtmlExtractor),
        tz,
    );
    info!(
        "sources: {}",
        registry
            .iter()
            .map(|a| a.identify().as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let collector = Arc::new(Collector::new(registry, store, config.collection.parallel));
    let scheduler = Arc::new(JobScheduler::new(tz));
    let control = ControlPlane::new(collector, scheduler.clone(), &config);

    // --------------------------------------------------------
    // One-shot mode
    // --------------------------------------------------------
    if let Some(days_back) = args.once {
        let result = control.collect_all(days_back).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    // --------------------------------------------------------
    // Scheduled mode
    // --------------------------------------------------------
    control
        .install_daily_job(config.schedule.hour, config.schedule.minute)
        .await?;
    scheduler.start()?;

    if let Some(next) = control.scheduler_status().await.next_daily_collection {
        info!("next daily collection at {}", next);
    }

    // Periodic, low-noise metrics line
    tokio::spawn(async {
        loop {
            sleep(Duration::from_secs(60)).await;
            info!("[METRICS] {}", METRICS.summary());
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    info!("shutdown requested, waiting for running jobs");
    scheduler.shutdown().await;
    info!("[METRICS] {}", METRICS.summary());

    Ok(())
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

// ------------------------------------------------------------
// Command line
// ------------------------------------------------------------
//
//   jurisprudence-collector [--config <path>] [--once [days]]
//
// The config path falls back to $JURIS_CONFIG, then config.json.
//
#[derive(Debug, PartialEq)]
struct CliArgs {
    config_path: String,

    /// `Some(None)` runs once with the configured manual window
    once: Option<Option<i64>>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
        let mut config_path = None;
        let mut once = None;
        let mut args = args.into_iter().peekable();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let Some(path) = args.next() else {
                        bail!("--config needs a path");
                    };
                    config_path = Some(path);
                }
                "--once" => {
                    let days = match args.peek().map(|a| a.parse::<i64>()) {
                        Some(Ok(days)) => {
                            args.next();
                            Some(days)
                        }
                        _ => None,
                    };
                    once = Some(days);
                }
                other => bail!("unknown argument '{other}'"),
            }
        }

        let config_path = config_path
            .or_else(|| env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

        Ok(CliArgs { config_path, once })
    }
}
