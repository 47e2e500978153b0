use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use tokio::sync::broadcast;
use tracing::{info, warn};

use acd_core::logging::init_tracing;
use acd_core::serde_utils::to_pretty_json;
use acd_core::{CoreConfig, FormulaVariant, Timestamp};
use acd_engine::presenter::{clock_display, result_line};
use acd_engine::{EngineEvent, EngineRuntime, SystemClock};

mod shell;

#[derive(Parser)]
#[command(name = "acd")]
#[command(about = "ACD password calculator - time-driven 4-digit codes", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "ACD_LOG_LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the code for a given date and time
    Compute(ComputeArgs),
    /// Follow the clock and print the code every time it changes
    Watch(EngineArgs),
    /// Drive the engine from stdin (edit, set, apply, cancel, variant, calc)
    Interactive(EngineArgs),
    /// Show version information
    Version,
}

#[derive(Args)]
struct ComputeArgs {
    /// Date and time as YYYY-MM-DDTHH:MM (defaults to now)
    #[arg(long)]
    at: Option<String>,
    /// Password type: bypass or menu
    #[arg(long, short)]
    variant: Option<FormulaVariant>,
    /// Print the full result as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args)]
struct EngineArgs {
    /// Password type: bypass or menu
    #[arg(long, short)]
    variant: Option<FormulaVariant>,
    /// Clock sampling interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,
}

impl EngineArgs {
    fn apply_to(&self, config: &mut CoreConfig) {
        if let Some(variant) = self.variant {
            config.default_variant = variant;
        }
        if let Some(ms) = self.tick_ms.filter(|ms| *ms > 0) {
            config.tick_interval = Duration::from_millis(ms);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = CoreConfig::from_env().context("loading configuration")?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    init_tracing(Some(&config.log_level))?;

    match cli.command {
        Commands::Compute(args) => {
            let at = match args.at.as_deref() {
                Some(raw) => Timestamp::parse(raw)?,
                None => Timestamp::now_local(),
            };
            let variant = args.variant.unwrap_or(config.default_variant);
            let result = acd_engine::evaluate(&at, variant)?;
            if args.json {
                println!("{}", to_pretty_json(&result)?);
            } else {
                println!("{}", result.code);
            }
        }
        Commands::Watch(args) => {
            args.apply_to(&mut config);
            watch(&config).await?;
        }
        Commands::Interactive(args) => {
            args.apply_to(&mut config);
            let runtime = EngineRuntime::start_with_clock(&config, Arc::new(SystemClock));
            let outcome = shell::run(runtime.handle()).await;
            runtime.shutdown().await;
            outcome?;
        }
        Commands::Version => {
            println!("ACD passcode engine v{}", env!("CARGO_PKG_VERSION"));
            for variant in FormulaVariant::ALL {
                println!("  {:<20} {}", variant.label(), variant.formula());
            }
        }
    }

    Ok(())
}

async fn watch(config: &CoreConfig) -> anyhow::Result<()> {
    let runtime = EngineRuntime::start_with_clock(config, Arc::new(SystemClock));
    let handle = runtime.handle();
    let mut events = handle.subscribe_events();

    let snapshot = handle.snapshot().await?;
    let clock = clock_display(&snapshot.committed);
    println!("{} {} {}", "●".green(), clock.time, clock.date);
    if let Some(result) = &snapshot.result {
        println!("{}", result_line(result));
    }
    info!(variant = %snapshot.variant, "watching clock, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(EngineEvent::ResultChanged { result, .. }) => println!("{}", result_line(&result)),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "watch output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    runtime.shutdown().await;
    Ok(())
}
