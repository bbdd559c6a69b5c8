//! Background services for the venue

pub mod expiry_scanner;
pub mod market_locks;

pub use expiry_scanner::{ExpiryScanner, ScanPass};
pub use market_locks::MarketLocks;
