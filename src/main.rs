//! CLI entry point for the sentiment rater.
//!
//! Provides subcommands for running the scheduled indicator updates and for
//! triggering on-demand recomputation of an indicator or a whole aggregate.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sentiment_rater::indicators::service::AnalysisService;
use sentiment_rater::store::{IndicatorFilter, JsonFileStore};
use sentiment_rater::types::UpdateMode;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "sentiment_rater")]
#[command(about = "Tracks sentiment indicators over scored social-media posts", long_about = None)]
struct Cli {
    /// Directory holding the document collections (posts, indicators, aggregates);
    /// falls back to DATA_DIR, then "data"
    #[arg(short, long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled update for all indicators
    Run {
        /// Which series to refresh
        #[arg(short, long, value_enum, default_value_t = Mode::Daily)]
        mode: Mode,
    },
    /// Recompute one indicator's series from scratch
    RecomputeIndicator {
        /// Indicator name
        name: String,
    },
    /// Recompute every indicator referencing an aggregate
    RecomputeAggregate {
        /// Aggregate name
        name: String,
    },
    /// Print an indicator's stored series as JSON
    Show {
        /// Indicator name
        name: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Daily,
    Monthly,
}

impl From<Mode> for UpdateMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Daily => UpdateMode::Daily,
            Mode::Monthly => UpdateMode::Monthly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/sentiment_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("sentiment_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| std::env::var("DATA_DIR").ok())
        .unwrap_or_else(|| "data".to_string());

    let store = Arc::new(JsonFileStore::new(&data_dir));
    let service = AnalysisService::new(store.clone())?;

    match cli.command {
        Commands::Run { mode } => {
            service.run_scheduled(mode.into()).await?;
        }
        Commands::RecomputeIndicator { name } => {
            let outcome = service.recompute_indicator(&name).await?;
            info!(
                indicator = %name,
                daily = outcome.new_daily_entries,
                monthly = outcome.new_monthly_entries,
                "Recompute complete"
            );
        }
        Commands::RecomputeAggregate { name } => {
            service.recompute_aggregate(&name).await?;
        }
        Commands::Show { name } => {
            use sentiment_rater::store::DocumentStore;

            let filter = IndicatorFilter::Names(vec![name.clone()]);
            let indicators = store.load_indicators(Some(&filter)).await?;
            match indicators.first() {
                Some(indicator) => println!("{}", serde_json::to_string_pretty(indicator)?),
                None => anyhow::bail!("indicator '{name}' not found"),
            }
        }
    }

    Ok(())
}
