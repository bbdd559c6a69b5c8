//! Expiry Scanner Service
//! Periodically resolves or escalates expired markets and closes elapsed appeal windows

use crate::types::{ExpiryOutcome, ExpiryReport, MarketId};
use crate::venue::Venue;
use crate::error::VenueResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Result of one scanner pass
#[derive(Debug, Default)]
pub struct ScanPass {
    pub expired: Vec<ExpiryReport>,
    pub finalized: Vec<MarketId>,
}

impl ScanPass {
    pub fn auto_resolved(&self) -> usize {
        self.expired
            .iter()
            .filter(|r| matches!(r.outcome, ExpiryOutcome::AutoResolved(_)))
            .count()
    }
}

/// Expiry scanner service
pub struct ExpiryScanner {
    venue: Arc<Venue>,
}

impl ExpiryScanner {
    pub fn new(venue: Arc<Venue>) -> Self {
        Self { venue }
    }

    /// Start the scanning loop
    pub async fn run(&self, check_interval: Duration) {
        info!("Expiry scanner started (interval: {:?})", check_interval);

        loop {
            if let Err(e) = self.run_once().await {
                error!("Expiry scan failed: {}", e);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// One pass: expired markets first, then appeal windows
    pub async fn run_once(&self) -> VenueResult<ScanPass> {
        let expired = self.venue.scan_expired_markets().await?;
        let finalized = self.venue.finalize_appeals().await?;

        let pass = ScanPass { expired, finalized };
        if !pass.expired.is_empty() || !pass.finalized.is_empty() {
            info!(
                "Expiry scan: {} expired ({} auto-resolved), {} appeal windows closed",
                pass.expired.len(),
                pass.auto_resolved(),
                pass.finalized.len()
            );
        }
        Ok(pass)
    }
}
