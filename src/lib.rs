//! Points Prediction Market Library
//!
//! A play-money prediction market venue. Users propose yes/no questions, trade
//! shares against an LMSR automated market maker and are paid out when a question
//! resolves.
//!
//! 1. **Pricing**: the logarithmic market scoring rule quotes every trade from the
//!    two outstanding-share counts; the house can lose at most B·ln 2 per market.
//!
//! 2. **Lifecycle**: markets move pending → active → resolved, with expired markets
//!    auto-resolved when the price is decisive and escalated to an admin otherwise.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod ledger;
pub mod markets;
pub mod positions;
pub mod pricing;
pub mod services;
pub mod types;
pub mod venue;

pub use config::Config;
pub use db::Database;
pub use error::{VenueError, VenueResult};
pub use pricing::LmsrPricing;
pub use services::{ExpiryScanner, MarketLocks};
pub use types::{Market, MarketId, MarketStatus, SellAmount, Side, UserId};
pub use venue::Venue;
