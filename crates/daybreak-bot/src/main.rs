//! Daybreak bot entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use daybreak_bot::{AppConfig, Application, EngineDeps};
use daybreak_core::{PhaseId, SystemClock};
use daybreak_gateway::{KisDailyChart, KisGateway};
use daybreak_notify::{FanoutNotifier, LogNotifier, SlackNotifier};
use tracing::info;

/// Pre-market momentum bot for KRX equities.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DAYBREAK_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Evaluate a single tick and exit
    #[arg(long)]
    once: bool,

    /// Validate the configuration, print the effective timetable and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = AppConfig::resolve_path(args.config);
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if args.check_config {
        print_timetable(&config)?;
        return Ok(());
    }

    daybreak_telemetry::init_logging(&config.logging)?;
    info!("Starting daybreak v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path.display(),
        mode = ?config.mode,
        universe = config.universe.len(),
        "Configuration loaded"
    );

    let offset = config.timetable.utc_offset_hours;
    let gateway = Arc::new(KisGateway::new(config.broker.kis_config(config.mode, offset)?)?);
    let market_data = Arc::new(KisDailyChart::new(Arc::clone(&gateway)));

    let mut notifier = FanoutNotifier::new().with(Arc::new(LogNotifier));
    if let Some(slack) = SlackNotifier::from_config(&config.notify)? {
        info!("Slack notifications enabled");
        notifier = notifier.with(Arc::new(slack));
    }

    let deps = EngineDeps {
        broker: gateway,
        market_data,
        notifier: Arc::new(notifier),
        clock: Arc::new(SystemClock::with_offset_hours(offset)?),
    };
    let app = Application::new(&config, deps)?;

    if args.once {
        let ran = app.run_once().await?;
        info!(phase = ?ran, "Single tick finished");
        return Ok(());
    }

    app.run().await?;
    info!("Shutdown complete");
    Ok(())
}

fn print_timetable(config: &AppConfig) -> Result<()> {
    let timetable = config.timetable.build()?;
    println!("{}", toml::to_string_pretty(&config.timetable)?);
    for phase in PhaseId::ALL {
        let (start, end) = timetable.window(phase);
        println!(
            "{:<8} {:<20} {} - {}",
            phase.label(),
            phase.to_string(),
            start.format("%H:%M"),
            end.format("%H:%M")
        );
    }
    println!("universe: {} instruments", config.universe.len());
    Ok(())
}
