use thiserror::Error;

use crate::core::types::{OrderId, VehicleId};
use crate::fleet::order::OrderStatus;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("State store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Vehicle not found: {0}")]
    VehicleNotFound(VehicleId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Invalid transition for {order}: {from:?} -> {to:?}")]
    InvalidTransition {
        order: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Simulation has not been initialized")]
    NotInitialized,

    #[error("Movement scheduler is already running")]
    AlreadyRunning,

    #[error("No async runtime: {0}")]
    Runtime(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FleetError {
    /// Store outages are retried by the scheduler; everything else is not.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
