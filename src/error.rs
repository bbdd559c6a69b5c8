//! Error taxonomy for venue operations
//!
//! Every validation error is raised before any mutation, so a returned error
//! means nothing was committed.

use crate::types::{MarketId, MarketStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors returned by the venue core
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    #[error("Insufficient shares: holding {held:.2}, requested {requested:.2}")]
    InsufficientShares { held: f64, requested: f64 },

    #[error("Market #{market_id} is not open for trading (status: {status})")]
    MarketNotActive { market_id: MarketId, status: MarketStatus },

    #[error("Market #{market_id} has expired and is waiting for resolution")]
    MarketExpired { market_id: MarketId },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot sell {requested:.2} shares, only {outstanding:.2} outstanding")]
    InvalidShareAmount { requested: f64, outstanding: f64 },

    /// The LMSR inversion produced a non-positive logarithm argument.
    /// Signals a parameter or math fault, not a caller mistake.
    #[error("Pricing domain error: {0}")]
    NumericDomain(String),

    #[error("Market #{market_id} was already processed (status: {status})")]
    AlreadyProcessed { market_id: MarketId, status: MarketStatus },

    #[error("Market #{0} not found")]
    NotFound(MarketId),

    #[error("Duration must be between {min} and {max} {unit}")]
    InvalidDuration { min: u32, max: u32, unit: &'static str },

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Proposal cooldown active until {ready_at}")]
    ProposalCooldown { ready_at: DateTime<Utc> },

    #[error("Daily reward already claimed, next claim at {ready_at}")]
    ClaimCooldown { ready_at: DateTime<Utc> },

    #[error("Appeal window for market #{market_id} closed at {closed_at}")]
    AppealWindowClosed { market_id: MarketId, closed_at: DateTime<Utc> },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl VenueError {
    /// Whether the error was caused by the caller's request rather than a system fault
    pub fn is_user_error(&self) -> bool {
        !matches!(self, VenueError::NumericDomain(_) | VenueError::Database(_))
    }
}

pub type VenueResult<T> = Result<T, VenueError>;
