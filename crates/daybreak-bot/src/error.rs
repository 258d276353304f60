//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Core error: {0}")]
    Core(#[from] daybreak_core::CoreError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] daybreak_gateway::GatewayError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] daybreak_strategy::StrategyError),

    #[error("Position error: {0}")]
    Position(#[from] daybreak_position::PositionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] daybreak_persistence::PersistenceError),

    #[error("Notification error: {0}")]
    Notify(#[from] daybreak_notify::NotifyError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] daybreak_telemetry::TelemetryError),

    #[error("Scheduler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
