//! Per-market exclusive access
//!
//! Every read-compute-write sequence on a market's pool or status runs while
//! holding that market's guard. Different markets never share a guard.

use crate::types::MarketId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Registry of one async mutex per market
#[derive(Clone, Default)]
pub struct MarketLocks {
    locks: Arc<Mutex<HashMap<MarketId, Arc<Mutex<()>>>>>,
}

impl MarketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a market. The guard releases on drop.
    pub async fn acquire(&self, market_id: MarketId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(market_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop entries nobody holds or waits on. Returns how many remain.
    pub async fn prune(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let removed = before - locks.len();
        if removed > 0 {
            debug!(
                "[MarketLocks] Pruned {} idle market locks, {} in use",
                removed,
                locks.len()
            );
        }
        locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_market_is_exclusive() {
        let locks = MarketLocks::new();
        let guard = locks.acquire(1).await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = contender.acquire(1).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_markets_do_not_block() {
        let locks = MarketLocks::new();
        let _one = locks.acquire(1).await;
        let two = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2)).await;
        assert!(two.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = MarketLocks::new();
        let held = locks.acquire(1).await;
        drop(locks.acquire(2).await);

        assert_eq!(locks.prune().await, 1);

        drop(held);
        assert_eq!(locks.prune().await, 0);
    }
}
