//! Position error types.

use daybreak_gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Position not found: {0}")]
    NotFound(String),

    #[error("Position already exists: {0}")]
    Duplicate(String),

    #[error("Invalid position state: {0}")]
    InvalidState(String),

    #[error("Order failed: {0}")]
    Order(#[from] GatewayError),
}

pub type PositionResult<T> = Result<T, PositionError>;
