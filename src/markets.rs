//! Market records and the lifecycle state machine
//!
//! Status changes are compare-and-set updates (`WHERE status IN (...)`), issued as
//! the first write of their transaction. A lost race shows up as zero affected rows
//! and is reported as `AlreadyProcessed`.

use crate::config::ResolutionConfig;
use crate::db::{fmt_ts, row_to_market, row_to_price_point, row_to_settlement};
use crate::error::{VenueError, VenueResult};
use crate::ledger::Ledger;
use crate::positions::PositionBook;
use crate::pricing::LmsrPricing;
use crate::types::{
    from_units, points_from_f64, to_units, ExpiryOutcome, ExpiryReport, Market, MarketId,
    MarketStatus, OverrideSummary, PriceHistoryPoint, ResolutionSummary, SettlementRecord, Side,
    UserId, VenueStats,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};
use tracing::{info, warn};

/// What happens to an expired market at a given YES probability (in percent)
pub fn expiry_outcome(prob_yes: f64, config: &ResolutionConfig) -> ExpiryOutcome {
    if config.auto_resolve_enabled {
        if prob_yes >= config.threshold {
            return ExpiryOutcome::AutoResolved(Side::Yes);
        }
        if prob_yes <= 100.0 - config.threshold {
            return ExpiryOutcome::AutoResolved(Side::No);
        }
    }
    ExpiryOutcome::AwaitingResolution
}

#[derive(Debug, Clone)]
pub struct MarketStore {
    pricing: LmsrPricing,
    resolution: ResolutionConfig,
    ledger: Ledger,
    positions: PositionBook,
}

impl MarketStore {
    pub fn new(pricing: LmsrPricing, resolution: ResolutionConfig, ledger: Ledger) -> Self {
        Self {
            pricing,
            resolution,
            ledger,
            positions: PositionBook,
        }
    }

    // ==================== READS ====================

    pub async fn get(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<Option<Market>> {
        let row = sqlx::query("SELECT * FROM markets WHERE market_id = ?")
            .bind(market_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(row_to_market).transpose()?)
    }

    pub async fn require(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<Market> {
        self.get(conn, market_id)
            .await?
            .ok_or(VenueError::NotFound(market_id))
    }

    /// Newest first, optionally filtered by status
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        status: Option<MarketStatus>,
        limit: i64,
    ) -> VenueResult<Vec<Market>> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query(
            "SELECT * FROM markets WHERE (? IS NULL OR status = ?) ORDER BY market_id DESC LIMIT ?",
        )
        .bind(status)
        .bind(status)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.iter().map(row_to_market).collect::<Result<Vec<_>, _>>()?)
    }

    /// Active markets whose close time has passed
    pub async fn list_expired(&self, conn: &mut SqliteConnection, now: DateTime<Utc>) -> VenueResult<Vec<Market>> {
        let rows = sqlx::query(
            "SELECT * FROM markets WHERE status = 'active' AND closes_at <= ? ORDER BY closes_at, market_id",
        )
        .bind(fmt_ts(now))
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.iter().map(row_to_market).collect::<Result<Vec<_>, _>>()?)
    }

    /// Auto-resolved markets whose appeal window has elapsed
    pub async fn list_appeals_due(&self, conn: &mut SqliteConnection, now: DateTime<Utc>) -> VenueResult<Vec<MarketId>> {
        let cutoff = now - self.resolution.appeal_window();
        let rows = sqlx::query(
            "SELECT market_id FROM markets WHERE status = 'auto_resolved' AND resolved_at < ? ORDER BY market_id",
        )
        .bind(fmt_ts(cutoff))
        .fetch_all(&mut *conn)
        .await?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get("market_id")?);
        }
        Ok(ids)
    }

    pub async fn price_history(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<Vec<PriceHistoryPoint>> {
        let rows = sqlx::query("SELECT * FROM price_history WHERE market_id = ? ORDER BY timestamp, id")
            .bind(market_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.iter().map(row_to_price_point).collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn settlements(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<Vec<SettlementRecord>> {
        let rows = sqlx::query("SELECT * FROM settlements WHERE market_id = ? ORDER BY id")
            .bind(market_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.iter().map(row_to_settlement).collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn stats(&self, conn: &mut SqliteConnection) -> VenueResult<VenueStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM markets WHERE status = 'active') AS active_markets,
                (SELECT COUNT(*) FROM users WHERE balance > 0) AS active_traders,
                (SELECT COALESCE(SUM(fee_collected), 0) FROM markets) AS total_fees
            "#,
        )
        .fetch_one(&mut *conn)
        .await?;

        Ok(VenueStats {
            active_markets: row.try_get("active_markets")?,
            active_traders: row.try_get("active_traders")?,
            total_fees: from_units(row.try_get("total_fees")?),
        })
    }

    // ==================== WRITES ====================

    /// Create a pending market with an empty pool and its opening price point
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        question: &str,
        creator_id: UserId,
        created_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
        proposal_cost: Decimal,
    ) -> VenueResult<Market> {
        let row = sqlx::query(
            r#"
            INSERT INTO markets (question, creator_id, created_at, closes_at, status, q_yes, q_no, fee_collected, proposal_cost)
            VALUES (?, ?, ?, ?, 'pending', 0, 0, 0, ?)
            RETURNING *
            "#,
        )
        .bind(question)
        .bind(creator_id)
        .bind(fmt_ts(created_at))
        .bind(fmt_ts(closes_at))
        .bind(to_units(proposal_cost))
        .fetch_one(&mut *conn)
        .await?;
        let market = row_to_market(&row)?;

        self.append_price(conn, market.id, self.pricing.price(0.0, 0.0), created_at)
            .await?;
        Ok(market)
    }

    pub async fn append_price(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        prob_yes: f64,
        at: DateTime<Utc>,
    ) -> VenueResult<()> {
        sqlx::query("INSERT INTO price_history (market_id, prob_yes, timestamp) VALUES (?, ?, ?)")
            .bind(market_id)
            .bind(prob_yes)
            .bind(fmt_ts(at))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Store the new pool and add `fee` to the collected fees
    pub async fn update_pool(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        (q_yes, q_no): (f64, f64),
        fee: Decimal,
    ) -> VenueResult<()> {
        sqlx::query("UPDATE markets SET q_yes = ?, q_no = ?, fee_collected = fee_collected + ? WHERE market_id = ?")
            .bind(q_yes)
            .bind(q_no)
            .bind(to_units(fee))
            .bind(market_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Move the market from one of `from` to `to`, or explain why it cannot move
    async fn set_status(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        from: &[MarketStatus],
        to: MarketStatus,
    ) -> VenueResult<()> {
        debug_assert!(from.iter().all(|s| s.can_transition_to(to)));

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE markets SET status = ? WHERE market_id = ? AND status IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(market_id);
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(self.not_processable(conn, market_id).await);
        }
        Ok(())
    }

    async fn not_processable(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueError {
        match self.get(conn, market_id).await {
            Ok(Some(market)) => VenueError::AlreadyProcessed {
                market_id,
                status: market.status,
            },
            Ok(None) => VenueError::NotFound(market_id),
            Err(e) => e,
        }
    }

    async fn set_resolution(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        result: Option<Side>,
        resolved_at: Option<DateTime<Utc>>,
        resolved_by: Option<UserId>,
    ) -> VenueResult<()> {
        sqlx::query("UPDATE markets SET result = ?, resolved_at = ?, resolved_by = ? WHERE market_id = ?")
            .bind(result.map(|s| s.as_str()))
            .bind(resolved_at.map(fmt_ts))
            .bind(resolved_by)
            .bind(market_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// pending -> active
    pub async fn approve(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<Market> {
        self.set_status(conn, market_id, &[MarketStatus::Pending], MarketStatus::Active)
            .await?;
        self.require(conn, market_id).await
    }

    /// pending -> rejected, refunding what the creator paid
    pub async fn reject(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<Market> {
        self.set_status(conn, market_id, &[MarketStatus::Pending], MarketStatus::Rejected)
            .await?;
        let market = self.require(conn, market_id).await?;

        if market.proposal_cost > Decimal::ZERO {
            self.ledger
                .apply_delta(conn, market.creator_id, market.proposal_cost)
                .await?;
        }
        Ok(market)
    }

    /// Delete a pending market and its price history, refund the creator and
    /// clear their proposal cooldown
    pub async fn withdraw(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        creator_id: UserId,
    ) -> VenueResult<Market> {
        let row = sqlx::query(
            "DELETE FROM markets WHERE market_id = ? AND status = 'pending' AND creator_id = ? RETURNING *",
        )
        .bind(market_id)
        .bind(creator_id)
        .fetch_optional(&mut *conn)
        .await?;

        let market = match row {
            Some(row) => row_to_market(&row)?,
            None => {
                return Err(match self.get(conn, market_id).await? {
                    None => VenueError::NotFound(market_id),
                    Some(m) if m.status != MarketStatus::Pending => VenueError::AlreadyProcessed {
                        market_id,
                        status: m.status,
                    },
                    Some(m) => VenueError::Forbidden(format!(
                        "market #{} was proposed by user {}, not {}",
                        market_id, m.creator_id, creator_id
                    )),
                })
            }
        };

        sqlx::query("DELETE FROM price_history WHERE market_id = ?")
            .bind(market_id)
            .execute(&mut *conn)
            .await?;
        if market.proposal_cost > Decimal::ZERO {
            self.ledger
                .apply_delta(conn, creator_id, market.proposal_cost)
                .await?;
        }
        self.ledger.set_last_proposal(conn, creator_id, None).await?;

        Ok(market)
    }

    /// active | awaiting_resolution -> closed, paying out the winners
    pub async fn resolve(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        winner: Side,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> VenueResult<ResolutionSummary> {
        self.set_status(
            conn,
            market_id,
            &[MarketStatus::Active, MarketStatus::AwaitingResolution],
            MarketStatus::Closed,
        )
        .await?;
        self.set_resolution(conn, market_id, Some(winner), Some(now), Some(admin_id))
            .await?;
        self.settle(conn, market_id, winner, now).await
    }

    /// Handle one expired active market: auto-resolve it when the price is decisive,
    /// otherwise hand it to an administrator. The pool is read after the market is
    /// claimed, so trades committed since it was listed are priced in.
    pub async fn expire(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        now: DateTime<Utc>,
    ) -> VenueResult<ExpiryReport> {
        self.claim_active(conn, market_id).await?;
        let market = self.require(conn, market_id).await?;

        let prob_yes = self.pricing.price(market.q_yes, market.q_no) * 100.0;
        let outcome = expiry_outcome(prob_yes, &self.resolution);

        let next = match outcome {
            ExpiryOutcome::AutoResolved(_) => MarketStatus::AutoResolved,
            ExpiryOutcome::AwaitingResolution => MarketStatus::AwaitingResolution,
        };
        self.set_status(conn, market_id, &[MarketStatus::Active], next)
            .await?;
        if let ExpiryOutcome::AutoResolved(winner) = outcome {
            self.set_resolution(conn, market_id, Some(winner), Some(now), None)
                .await?;
            self.settle(conn, market_id, winner, now).await?;
        }

        Ok(ExpiryReport {
            market_id,
            prob_yes,
            outcome,
        })
    }

    /// No-op write on an active market: takes the write lock before the pool is
    /// read, and fails with `AlreadyProcessed` once the market has moved on
    async fn claim_active(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<()> {
        let result = sqlx::query("UPDATE markets SET status = status WHERE market_id = ? AND status = ?")
            .bind(market_id)
            .bind(MarketStatus::Active.as_str())
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(self.not_processable(conn, market_id).await);
        }
        Ok(())
    }

    /// Pay every winning position `shares·(1-fee)`, snapshot all positions into
    /// settlements and delete them
    async fn settle(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        winner: Side,
        now: DateTime<Utc>,
    ) -> VenueResult<ResolutionSummary> {
        let positions = self.positions.list_for_market(conn, market_id).await?;

        let mut total_paid = Decimal::ZERO;
        let mut winner_count = 0;
        for position in &positions {
            let payout = if position.side == winner {
                points_from_f64(position.shares * (1.0 - self.pricing.fee)).ok_or_else(|| {
                    VenueError::NumericDomain(format!("payout for {} shares", position.shares))
                })?
            } else {
                Decimal::ZERO
            };

            sqlx::query(
                r#"
                INSERT INTO settlements (market_id, user_id, side, shares, cost_basis, payout, settled_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(market_id)
            .bind(position.user_id)
            .bind(position.side.as_str())
            .bind(position.shares)
            .bind(to_units(position.cost_basis))
            .bind(to_units(payout))
            .bind(fmt_ts(now))
            .execute(&mut *conn)
            .await?;

            if payout > Decimal::ZERO {
                self.ledger.apply_delta(conn, position.user_id, payout).await?;
                total_paid += payout;
                winner_count += 1;
            }
        }

        let cleared = self.positions.clear_market(conn, market_id).await?;
        info!(
            "Market #{} resolved {}: paid {} points to {} winners, cleared {} positions",
            market_id, winner, total_paid, winner_count, cleared
        );

        Ok(ResolutionSummary {
            market_id,
            winner,
            total_paid,
            winner_count,
            positions_cleared: positions.len(),
        })
    }

    /// auto_resolved -> awaiting_resolution within the appeal window.
    /// Restores the settled positions and recovers the payouts.
    pub async fn override_auto_resolution(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        now: DateTime<Utc>,
    ) -> VenueResult<OverrideSummary> {
        let window = self.resolution.appeal_window();
        let result = sqlx::query(
            r#"
            UPDATE markets SET status = 'awaiting_resolution', result = NULL, resolved_at = NULL, resolved_by = NULL
            WHERE market_id = ? AND status = 'auto_resolved' AND resolved_at >= ?
            "#,
        )
        .bind(market_id)
        .bind(fmt_ts(now - window))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let market = self.require(conn, market_id).await?;
            return Err(match (market.status, market.resolved_at) {
                (MarketStatus::AutoResolved, Some(resolved_at)) => VenueError::AppealWindowClosed {
                    market_id,
                    closed_at: resolved_at + window,
                },
                (status, _) => VenueError::AlreadyProcessed { market_id, status },
            });
        }

        let settlements = self.settlements(conn, market_id).await?;
        let mut clawed_back = Decimal::ZERO;
        let mut shortfall = Decimal::ZERO;
        for record in &settlements {
            self.positions.restore(conn, record).await?;

            if record.payout > Decimal::ZERO {
                let balance = self.ledger.get_balance(conn, record.user_id).await?;
                let recovered = record.payout.min(balance.max(Decimal::ZERO));
                if recovered > Decimal::ZERO {
                    self.ledger.apply_delta(conn, record.user_id, -recovered).await?;
                }
                clawed_back += recovered;
                if recovered < record.payout {
                    let missing = record.payout - recovered;
                    warn!(
                        "Override of market #{}: user {} already spent {} points of their payout",
                        market_id, record.user_id, missing
                    );
                    shortfall += missing;
                }
            }
        }

        sqlx::query("DELETE FROM settlements WHERE market_id = ?")
            .bind(market_id)
            .execute(&mut *conn)
            .await?;

        Ok(OverrideSummary {
            market_id,
            positions_restored: settlements.len(),
            clawed_back,
            shortfall,
        })
    }

    /// auto_resolved -> closed
    pub async fn confirm_auto_resolution(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        admin_id: Option<UserId>,
    ) -> VenueResult<Market> {
        self.set_status(conn, market_id, &[MarketStatus::AutoResolved], MarketStatus::Closed)
            .await?;
        if let Some(admin_id) = admin_id {
            sqlx::query("UPDATE markets SET resolved_by = ? WHERE market_id = ?")
                .bind(admin_id)
                .bind(market_id)
                .execute(&mut *conn)
                .await?;
        }
        self.require(conn, market_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EconomyConfig, TimeConfig};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn store() -> MarketStore {
        let ledger = Ledger::new(&EconomyConfig::default(), &TimeConfig::default());
        MarketStore::new(LmsrPricing::new(300.0, 0.05), ResolutionConfig::default(), ledger)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_expiry_outcome_thresholds() {
        let config = ResolutionConfig::default();
        assert_eq!(expiry_outcome(50.0, &config), ExpiryOutcome::AwaitingResolution);
        assert_eq!(expiry_outcome(70.0, &config), ExpiryOutcome::AutoResolved(Side::Yes));
        assert_eq!(expiry_outcome(30.0, &config), ExpiryOutcome::AutoResolved(Side::No));
        assert_eq!(expiry_outcome(69.9, &config), ExpiryOutcome::AwaitingResolution);

        let disabled = ResolutionConfig {
            auto_resolve_enabled: false,
            ..ResolutionConfig::default()
        };
        assert_eq!(expiry_outcome(99.0, &disabled), ExpiryOutcome::AwaitingResolution);
    }

    #[tokio::test]
    async fn test_insert_records_opening_price() {
        let db = crate::db::Database::in_memory().await.unwrap();
        let store = store();
        let mut tx = db.begin().await.unwrap();

        let market = store
            .insert(&mut tx, "Will it rain?", 3, t0(), t0() + Duration::hours(6), dec!(100))
            .await
            .unwrap();
        assert_eq!(market.status, MarketStatus::Pending);
        assert_eq!(market.proposal_cost, dec!(100));

        let history = store.price_history(&mut tx, market.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].prob_yes, 0.5);
    }

    #[tokio::test]
    async fn test_approve_twice_is_already_processed() {
        let db = crate::db::Database::in_memory().await.unwrap();
        let store = store();
        let mut tx = db.begin().await.unwrap();

        let market = store
            .insert(&mut tx, "Will it rain?", 3, t0(), t0() + Duration::hours(6), dec!(0))
            .await
            .unwrap();
        let approved = store.approve(&mut tx, market.id).await.unwrap();
        assert_eq!(approved.status, MarketStatus::Active);

        let err = store.approve(&mut tx, market.id).await.unwrap_err();
        assert!(matches!(
            err,
            VenueError::AlreadyProcessed { status: MarketStatus::Active, .. }
        ));
        assert!(matches!(
            store.approve(&mut tx, 999).await.unwrap_err(),
            VenueError::NotFound(999)
        ));
    }

    #[tokio::test]
    async fn test_reject_refunds_proposal_cost() {
        let db = crate::db::Database::in_memory().await.unwrap();
        let store = store();
        let mut tx = db.begin().await.unwrap();

        store.ledger.debit(&mut tx, 3, dec!(100)).await.unwrap();
        let market = store
            .insert(&mut tx, "Will it rain?", 3, t0(), t0() + Duration::hours(6), dec!(100))
            .await
            .unwrap();

        let rejected = store.reject(&mut tx, market.id).await.unwrap();
        assert_eq!(rejected.status, MarketStatus::Rejected);
        assert_eq!(store.ledger.get_balance(&mut tx, 3).await.unwrap(), dec!(1000));
        assert!(store.reject(&mut tx, market.id).await.is_err());
    }

    #[tokio::test]
    async fn test_withdraw_requires_creator_and_pending() {
        let db = crate::db::Database::in_memory().await.unwrap();
        let store = store();
        let mut tx = db.begin().await.unwrap();

        let market = store
            .insert(&mut tx, "Will it rain?", 3, t0(), t0() + Duration::hours(6), dec!(100))
            .await
            .unwrap();
        assert!(matches!(
            store.withdraw(&mut tx, market.id, 4).await.unwrap_err(),
            VenueError::Forbidden(_)
        ));

        store.withdraw(&mut tx, market.id, 3).await.unwrap();
        assert!(store.get(&mut tx, market.id).await.unwrap().is_none());
        assert!(store.price_history(&mut tx, market.id).await.unwrap().is_empty());
        assert_eq!(store.ledger.get_balance(&mut tx, 3).await.unwrap(), dec!(1100));
    }

    #[tokio::test]
    async fn test_resolve_pays_winners_and_snapshots() {
        let db = crate::db::Database::in_memory().await.unwrap();
        let store = store();
        let mut tx = db.begin().await.unwrap();

        let market = store
            .insert(&mut tx, "Will it rain?", 3, t0(), t0() + Duration::hours(6), dec!(0))
            .await
            .unwrap();
        store.approve(&mut tx, market.id).await.unwrap();
        store.positions.record_buy(&mut tx, market.id, 10, Side::Yes, 100.0, dec!(60)).await.unwrap();
        store.positions.record_buy(&mut tx, market.id, 11, Side::Yes, 40.0, dec!(20)).await.unwrap();
        store.positions.record_buy(&mut tx, market.id, 12, Side::No, 80.0, dec!(50)).await.unwrap();

        let summary = store
            .resolve(&mut tx, market.id, Side::Yes, 1, t0() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(summary.total_paid, dec!(133));
        assert_eq!(summary.winner_count, 2);
        assert_eq!(summary.positions_cleared, 3);

        assert_eq!(store.ledger.get_balance(&mut tx, 10).await.unwrap(), dec!(1095));
        assert_eq!(store.ledger.get_balance(&mut tx, 11).await.unwrap(), dec!(1038));
        assert_eq!(store.ledger.get_balance(&mut tx, 12).await.unwrap(), dec!(1000));
        assert!(store.positions.list_for_market(&mut tx, market.id).await.unwrap().is_empty());
        assert_eq!(store.settlements(&mut tx, market.id).await.unwrap().len(), 3);

        let closed = store.require(&mut tx, market.id).await.unwrap();
        assert_eq!(closed.status, MarketStatus::Closed);
        assert_eq!(closed.result, Some(Side::Yes));
        assert_eq!(closed.resolved_by, Some(1));

        assert!(matches!(
            store.resolve(&mut tx, market.id, Side::No, 1, t0()).await.unwrap_err(),
            VenueError::AlreadyProcessed { status: MarketStatus::Closed, .. }
        ));
    }
}
