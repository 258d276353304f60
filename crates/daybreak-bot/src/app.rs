//! Scheduler loop.
//!
//! Ticks the [`PhaseEngine`] on a fixed interval until an operator signal
//! arrives. A tick that fails or panics is logged and followed by a
//! cooldown; the day then continues from whatever its flags say.

use std::sync::Arc;
use std::time::Duration;

use daybreak_core::PhaseId;
use daybreak_notify::{Notification, SharedNotifier};
use daybreak_telemetry::Metrics;
use tokio::signal;
use tokio::sync::Mutex;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::engine::{EngineDeps, PhaseEngine};
use crate::error::AppResult;

/// Main application.
pub struct Application {
    engine: Arc<Mutex<PhaseEngine>>,
    notifier: SharedNotifier,
    tick: Duration,
    cooldown: Duration,
    liquidate_on_interrupt: bool,
}

impl Application {
    pub fn new(config: &AppConfig, deps: EngineDeps) -> AppResult<Self> {
        let notifier = deps.notifier.clone();
        let engine = PhaseEngine::new(config, deps)?;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            notifier,
            tick: config.timetable.tick(),
            cooldown: config.timetable.cooldown(),
            liquidate_on_interrupt: config.shutdown.liquidate_on_interrupt,
        })
    }

    #[must_use]
    pub fn engine(&self) -> Arc<Mutex<PhaseEngine>> {
        Arc::clone(&self.engine)
    }

    /// Run a single tick on its own task so a panic surfaces as an error.
    pub async fn run_once(&self) -> AppResult<Option<PhaseId>> {
        let engine = Arc::clone(&self.engine);
        let handle = tokio::spawn(async move { engine.lock().await.tick().await });
        handle.await?
    }

    /// Tick until interrupted, then clean up.
    pub async fn run(&self) -> AppResult<()> {
        info!(
            tick_secs = self.tick.as_secs(),
            cooldown_secs = self.cooldown.as_secs(),
            liquidate_on_interrupt = self.liquidate_on_interrupt,
            "Entering scheduler loop"
        );

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(Some(phase)) => debug!(phase = %phase, "Tick ran phase"),
                        Ok(None) => {}
                        Err(e) => {
                            Metrics::scheduler_error();
                            error!(error = %e, cooldown_secs = self.cooldown.as_secs(), "Scheduler tick failed");
                            self.notifier.notify(Notification::SchedulerError {
                                error: e.to_string(),
                                cooldown_secs: self.cooldown.as_secs(),
                            });
                            tokio::select! {
                                _ = sleep(self.cooldown) => {}
                                reason = &mut shutdown => break reason,
                            }
                            ticker.reset();
                        }
                    }
                }

                reason = &mut shutdown => break reason,
            }
        };

        info!(reason, "Shutdown signal received");
        let mut engine = self.engine.lock().await;
        if let Some(summary) = engine.shutdown(self.liquidate_on_interrupt, reason).await {
            info!(
                closed = summary.closed.len(),
                failed = summary.failed.len(),
                "Interrupt liquidation finished"
            );
        }
        Ok(())
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "interrupt",
        _ = terminate => "terminate",
    }
}
