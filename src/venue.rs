//! Venue facade
//!
//! Owns the database, configuration and per-market lock registry, and exposes
//! every venue operation. Each mutating call takes the market's lock (when it
//! touches an existing market), runs in one transaction and commits at the end;
//! any error drops the transaction and nothing is persisted.
//!
//! Time-dependent operations have an `_at` variant taking the clock explicitly.

use crate::config::Config;
use crate::coordinator::TradeCoordinator;
use crate::db::Database;
use crate::error::{VenueError, VenueResult};
use crate::ledger::Ledger;
use crate::markets::MarketStore;
use crate::positions::PositionBook;
use crate::pricing::LmsrPricing;
use crate::services::MarketLocks;
use crate::types::{
    points_from_f64, BuyReceipt, DailyClaim, ExpiryOutcome, ExpiryReport, LeaderboardEntry,
    Market, MarketId, MarketStatus, OverrideSummary, PortfolioEntry, PriceHistoryPoint,
    ResolutionSummary, SellAmount, SellReceipt, Side, UserId, VenueStats,
};
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

const MIN_QUESTION_CHARS: usize = 5;
const MAX_QUESTION_CHARS: usize = 100;

/// Current time at storage precision
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub struct Venue {
    db: Database,
    config: Config,
    pricing: LmsrPricing,
    ledger: Ledger,
    positions: PositionBook,
    markets: MarketStore,
    coordinator: TradeCoordinator,
    locks: MarketLocks,
}

impl Venue {
    pub fn new(db: Database, config: Config) -> Self {
        let pricing = config.pricing();
        let ledger = Ledger::new(&config.economy, &config.time);
        let markets = MarketStore::new(pricing, config.resolution.clone(), ledger.clone());
        let coordinator = TradeCoordinator::new(pricing, ledger.clone(), markets.clone());

        Self {
            db,
            config,
            pricing,
            ledger,
            positions: PositionBook,
            markets,
            coordinator,
            locks: MarketLocks::new(),
        }
    }

    /// Open the configured database and build the venue
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let db = Database::new(&config.database_path).await?;
        Ok(Self::new(db, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current YES probability of a market in [0, 1]
    pub fn prob_yes(&self, market: &Market) -> f64 {
        self.pricing.price(market.q_yes, market.q_no)
    }

    // ==================== PROPOSALS ====================

    pub async fn propose_market(
        &self,
        question: &str,
        duration: u32,
        creator_id: UserId,
        is_privileged: bool,
    ) -> VenueResult<MarketId> {
        self.propose_market_at(question, duration, creator_id, is_privileged, now())
            .await
    }

    /// Create a pending market. Non-privileged creators pay the proposal cost and
    /// are held to the duration bounds and the proposal cooldown.
    pub async fn propose_market_at(
        &self,
        question: &str,
        duration: u32,
        creator_id: UserId,
        is_privileged: bool,
        now: DateTime<Utc>,
    ) -> VenueResult<MarketId> {
        let question = question.trim();
        let chars = question.chars().count();
        if !(MIN_QUESTION_CHARS..=MAX_QUESTION_CHARS).contains(&chars) {
            return Err(VenueError::InvalidQuestion(format!(
                "must be {}-{} characters, got {}",
                MIN_QUESTION_CHARS, MAX_QUESTION_CHARS, chars
            )));
        }

        let time = &self.config.time;
        let (min, max) = if is_privileged {
            (0, time.privileged_max_duration())
        } else {
            (time.min_duration, time.max_duration)
        };
        let invalid_duration = VenueError::InvalidDuration {
            min,
            max,
            unit: time.unit.as_str(),
        };
        if !(min..=max).contains(&duration) {
            return Err(invalid_duration);
        }
        let Some(closes_at) = now.checked_add_signed(time.unit.duration(duration)) else {
            return Err(invalid_duration);
        };

        let mut tx = self.db.begin().await?;
        let account = self.ledger.account(&mut tx, creator_id).await?;

        let proposal_cost = if is_privileged {
            Decimal::ZERO
        } else {
            if let Some(last) = account.last_proposal {
                let ready_at = last + time.proposal_cooldown();
                if now < ready_at {
                    return Err(VenueError::ProposalCooldown { ready_at });
                }
            }
            let cost = self.config.economy.proposal_cost;
            self.ledger.debit(&mut tx, creator_id, cost).await?;
            self.ledger
                .set_last_proposal(&mut tx, creator_id, Some(now))
                .await?;
            cost
        };

        let market = self
            .markets
            .insert(&mut tx, question, creator_id, now, closes_at, proposal_cost)
            .await?;
        tx.commit().await?;

        info!(
            "Market #{} proposed by user {} (cost {}, closes {}): {}",
            market.id,
            creator_id,
            proposal_cost,
            closes_at,
            market.short_question(60)
        );
        Ok(market.id)
    }

    pub async fn approve_market(&self, market_id: MarketId, admin_id: UserId) -> VenueResult<Market> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let market = self.markets.approve(&mut tx, market_id).await?;
        tx.commit().await?;

        info!("Market #{} approved by admin {}", market_id, admin_id);
        Ok(market)
    }

    pub async fn reject_market(&self, market_id: MarketId, admin_id: UserId) -> VenueResult<Market> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let market = self.markets.reject(&mut tx, market_id).await?;
        tx.commit().await?;

        info!(
            "Market #{} rejected by admin {}, refunded {} to user {}",
            market_id, admin_id, market.proposal_cost, market.creator_id
        );
        Ok(market)
    }

    /// Undo a proposal whose announcement could not be delivered
    pub async fn withdraw_proposal(&self, market_id: MarketId, creator_id: UserId) -> VenueResult<Market> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let market = self.markets.withdraw(&mut tx, market_id, creator_id).await?;
        tx.commit().await?;

        warn!(
            "Market #{} withdrawn by user {}, refunded {}",
            market_id, creator_id, market.proposal_cost
        );
        Ok(market)
    }

    // ==================== TRADING ====================

    pub async fn buy(
        &self,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
        amount: Decimal,
    ) -> VenueResult<BuyReceipt> {
        self.buy_at(market_id, user_id, side, amount, now()).await
    }

    pub async fn buy_at(
        &self,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> VenueResult<BuyReceipt> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let receipt = self
            .coordinator
            .buy(&mut tx, market_id, user_id, side, amount, now)
            .await?;
        tx.commit().await?;
        Ok(receipt)
    }

    pub async fn sell(
        &self,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
        amount: SellAmount,
    ) -> VenueResult<SellReceipt> {
        self.sell_at(market_id, user_id, side, amount, now()).await
    }

    pub async fn sell_at(
        &self,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
        amount: SellAmount,
        now: DateTime<Utc>,
    ) -> VenueResult<SellReceipt> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let receipt = self
            .coordinator
            .sell(&mut tx, market_id, user_id, side, amount, now)
            .await?;
        tx.commit().await?;
        Ok(receipt)
    }

    // ==================== RESOLUTION ====================

    pub async fn resolve_market(
        &self,
        market_id: MarketId,
        winner: Side,
        admin_id: UserId,
    ) -> VenueResult<ResolutionSummary> {
        self.resolve_market_at(market_id, winner, admin_id, now()).await
    }

    pub async fn resolve_market_at(
        &self,
        market_id: MarketId,
        winner: Side,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> VenueResult<ResolutionSummary> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let summary = self
            .markets
            .resolve(&mut tx, market_id, winner, admin_id, now)
            .await?;
        tx.commit().await?;

        info!("Market #{} resolved {} by admin {}", market_id, winner, admin_id);
        Ok(summary)
    }

    pub async fn scan_expired_markets(&self) -> VenueResult<Vec<ExpiryReport>> {
        self.scan_expired_at(now()).await
    }

    /// Auto-resolve or escalate every active market past its close time.
    /// Each market runs under its own lock and transaction; a failure is logged
    /// and the scan moves on.
    pub async fn scan_expired_at(&self, now: DateTime<Utc>) -> VenueResult<Vec<ExpiryReport>> {
        let expired = {
            let mut conn = self.db.pool().acquire().await?;
            self.markets.list_expired(&mut conn, now).await?
        };

        let mut reports = Vec::with_capacity(expired.len());
        for market in expired {
            match self.expire_one(market.id, now).await {
                Ok(report) => {
                    match report.outcome {
                        ExpiryOutcome::AutoResolved(side) => info!(
                            "Market #{} auto-resolved {} at {:.1}%",
                            market.id, side, report.prob_yes
                        ),
                        ExpiryOutcome::AwaitingResolution => info!(
                            "Market #{} expired at {:.1}%, awaiting admin resolution",
                            market.id, report.prob_yes
                        ),
                    }
                    reports.push(report);
                }
                Err(VenueError::AlreadyProcessed { status, .. }) => {
                    debug!("Market #{} already moved to {} before expiry", market.id, status);
                }
                Err(e) => {
                    error!("Failed to process expired market #{}: {}", market.id, e);
                }
            }
        }
        Ok(reports)
    }

    async fn expire_one(&self, market_id: MarketId, now: DateTime<Utc>) -> VenueResult<ExpiryReport> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let report = self.markets.expire(&mut tx, market_id, now).await?;
        tx.commit().await?;
        Ok(report)
    }

    pub async fn override_auto_resolution(
        &self,
        market_id: MarketId,
        admin_id: UserId,
    ) -> VenueResult<OverrideSummary> {
        self.override_auto_resolution_at(market_id, admin_id, now()).await
    }

    /// Reopen an auto-resolved market for manual resolution within the appeal window
    pub async fn override_auto_resolution_at(
        &self,
        market_id: MarketId,
        admin_id: UserId,
        now: DateTime<Utc>,
    ) -> VenueResult<OverrideSummary> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let summary = self
            .markets
            .override_auto_resolution(&mut tx, market_id, now)
            .await?;
        tx.commit().await?;

        info!(
            "Auto-resolution of market #{} overridden by admin {}: {} positions restored, {} clawed back",
            market_id, admin_id, summary.positions_restored, summary.clawed_back
        );
        if summary.shortfall > Decimal::ZERO {
            warn!(
                "Override of market #{} left {} points of payouts unrecovered",
                market_id, summary.shortfall
            );
        }
        Ok(summary)
    }

    pub async fn confirm_auto_resolution(&self, market_id: MarketId, admin_id: UserId) -> VenueResult<Market> {
        let _guard = self.locks.acquire(market_id).await;
        let mut tx = self.db.begin().await?;
        let market = self
            .markets
            .confirm_auto_resolution(&mut tx, market_id, Some(admin_id))
            .await?;
        tx.commit().await?;

        info!("Auto-resolution of market #{} confirmed by admin {}", market_id, admin_id);
        Ok(market)
    }

    pub async fn finalize_appeals(&self) -> VenueResult<Vec<MarketId>> {
        self.finalize_appeals_at(now()).await
    }

    /// Close auto-resolved markets whose appeal window has elapsed
    pub async fn finalize_appeals_at(&self, now: DateTime<Utc>) -> VenueResult<Vec<MarketId>> {
        let due = {
            let mut conn = self.db.pool().acquire().await?;
            self.markets.list_appeals_due(&mut conn, now).await?
        };

        let mut closed = Vec::with_capacity(due.len());
        for market_id in due {
            let _guard = self.locks.acquire(market_id).await;
            let result = async {
                let mut tx = self.db.begin().await?;
                self.markets
                    .confirm_auto_resolution(&mut tx, market_id, None)
                    .await?;
                tx.commit().await?;
                Ok::<_, VenueError>(())
            }
            .await;

            match result {
                Ok(()) => {
                    info!("Appeal window of market #{} elapsed, market closed", market_id);
                    closed.push(market_id);
                }
                Err(e) => error!("Failed to close market #{}: {}", market_id, e),
            }
        }

        self.locks.prune().await;
        Ok(closed)
    }

    // ==================== ACCOUNTS ====================

    pub async fn get_balance(&self, user_id: UserId) -> VenueResult<Decimal> {
        let mut tx = self.db.begin().await?;
        let balance = self.ledger.get_balance(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(balance)
    }

    pub async fn claim_daily(&self, user_id: UserId) -> VenueResult<DailyClaim> {
        self.claim_daily_at(user_id, now()).await
    }

    pub async fn claim_daily_at(&self, user_id: UserId, now: DateTime<Utc>) -> VenueResult<DailyClaim> {
        let mut tx = self.db.begin().await?;
        let claim = self.ledger.claim_daily(&mut tx, user_id, now).await?;
        tx.commit().await?;
        Ok(claim)
    }

    /// Open positions valued at what selling them right now would return
    pub async fn get_portfolio(&self, user_id: UserId) -> VenueResult<Vec<PortfolioEntry>> {
        let mut conn = self.db.pool().acquire().await?;
        let positions = self.positions.list_for_user(&mut conn, user_id).await?;

        let mut entries = Vec::with_capacity(positions.len());
        for position in positions {
            let Some(market) = self.markets.get(&mut conn, position.market_id).await? else {
                continue;
            };
            if !matches!(
                market.status,
                MarketStatus::Active | MarketStatus::AwaitingResolution
            ) {
                continue;
            }

            let (q_target, q_other) = market.pool_for(position.side);
            let current_value = self
                .pricing
                .sell(q_target, q_other, position.shares.min(q_target))
                .ok()
                .and_then(|quote| points_from_f64(quote.net_payout))
                .unwrap_or_else(|| {
                    warn!(
                        "Could not value {} {} shares in market #{}",
                        position.shares, position.side, market.id
                    );
                    Decimal::ZERO
                });

            entries.push(PortfolioEntry {
                market_id: market.id,
                question: market.question,
                status: market.status,
                side: position.side,
                shares: position.shares,
                cost_basis: position.cost_basis,
                current_value,
                pnl: current_value - position.cost_basis,
            });
        }
        Ok(entries)
    }

    pub async fn leaderboard(&self, limit: i64) -> VenueResult<Vec<LeaderboardEntry>> {
        let mut conn = self.db.pool().acquire().await?;
        self.ledger.leaderboard(&mut conn, limit).await
    }

    // ==================== MARKET QUERIES ====================

    pub async fn get_market(&self, market_id: MarketId) -> VenueResult<Market> {
        let mut conn = self.db.pool().acquire().await?;
        self.markets.require(&mut conn, market_id).await
    }

    pub async fn list_markets(&self, status: Option<MarketStatus>, limit: i64) -> VenueResult<Vec<Market>> {
        let mut conn = self.db.pool().acquire().await?;
        self.markets.list(&mut conn, status, limit).await
    }

    pub async fn price_history(&self, market_id: MarketId) -> VenueResult<Vec<PriceHistoryPoint>> {
        let mut conn = self.db.pool().acquire().await?;
        self.markets.require(&mut conn, market_id).await?;
        self.markets.price_history(&mut conn, market_id).await
    }

    pub async fn venue_stats(&self) -> VenueResult<VenueStats> {
        let mut conn = self.db.pool().acquire().await?;
        self.markets.stats(&mut conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const ADMIN: UserId = 1;
    const FEE_KEPT: f64 = 1.0 - 0.05;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    async fn venue() -> Venue {
        let db = Database::in_memory().await.unwrap();
        Venue::new(db, Config::default())
    }

    /// Privileged proposal, approved, closing `hours` after t0
    async fn open_market(venue: &Venue, hours: u32) -> MarketId {
        let id = venue
            .propose_market_at("Will the test pass?", hours, ADMIN, true, t0())
            .await
            .unwrap();
        venue.approve_market(id, ADMIN).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_proposal_validation() {
        let venue = venue().await;

        assert!(matches!(
            venue.propose_market_at("Hm?", 24, 5, false, t0()).await.unwrap_err(),
            VenueError::InvalidQuestion(_)
        ));
        assert!(matches!(
            venue
                .propose_market_at(&"x".repeat(101), 24, 5, false, t0())
                .await
                .unwrap_err(),
            VenueError::InvalidQuestion(_)
        ));
        assert!(matches!(
            venue.propose_market_at("Will it snow?", 2, 5, false, t0()).await.unwrap_err(),
            VenueError::InvalidDuration { min: 6, max: 168, .. }
        ));

        let id = venue.propose_market_at("Will it snow?", 24, 5, false, t0()).await.unwrap();
        let market = venue.get_market(id).await.unwrap();
        assert_eq!(market.status, MarketStatus::Pending);
        assert_eq!(market.closes_at, t0() + Duration::hours(24));
        assert_eq!(venue.get_balance(5).await.unwrap(), dec!(900));

        let err = venue
            .propose_market_at("Will it hail?", 24, 5, false, t0() + Duration::hours(1))
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::ProposalCooldown { .. }));
        venue
            .propose_market_at("Will it hail?", 24, 5, false, t0() + Duration::hours(4))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_privileged_proposal_is_free() {
        let venue = venue().await;
        venue.propose_market_at("Free question", 1000, 2, true, t0()).await.unwrap();
        venue.propose_market_at("Another one!", 0, 2, true, t0()).await.unwrap();
        assert_eq!(venue.get_balance(2).await.unwrap(), dec!(1000));
    }

    #[tokio::test]
    async fn test_privileged_duration_is_capped() {
        let venue = venue().await;
        let err = venue
            .propose_market_at("Far future question", u32::MAX, ADMIN, true, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, VenueError::InvalidDuration { min: 0, max: 87_600, .. }));

        let id = venue
            .propose_market_at("Far future question", 87_600, ADMIN, true, t0())
            .await
            .unwrap();
        let market = venue.get_market(id).await.unwrap();
        assert_eq!(market.closes_at, t0() + Duration::hours(87_600));
        assert_eq!(venue.list_markets(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_restores_everything() {
        let venue = venue().await;
        let id = venue.propose_market_at("Will it snow?", 24, 5, false, t0()).await.unwrap();

        venue.withdraw_proposal(id, 5).await.unwrap();
        assert!(matches!(venue.get_market(id).await.unwrap_err(), VenueError::NotFound(_)));
        assert!(matches!(venue.price_history(id).await.unwrap_err(), VenueError::NotFound(_)));
        assert_eq!(venue.get_balance(5).await.unwrap(), dec!(1000));

        // Cooldown cleared
        venue.propose_market_at("Will it snow?", 24, 5, false, t0()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_market_cannot_trade() {
        let venue = venue().await;
        let id = venue.propose_market_at("Will it snow?", 24, 5, false, t0()).await.unwrap();
        let err = venue.buy_at(id, 7, Side::Yes, dec!(10), t0()).await.unwrap_err();
        assert!(matches!(
            err,
            VenueError::MarketNotActive { status: MarketStatus::Pending, .. }
        ));
    }

    #[tokio::test]
    async fn test_resolution_pays_shares_net_of_fee() {
        let venue = venue().await;
        let id = open_market(&venue, 24).await;

        let a = venue.buy_at(id, 10, Side::Yes, dec!(100), t0()).await.unwrap();
        let b = venue.buy_at(id, 11, Side::Yes, dec!(50), t0()).await.unwrap();
        venue.buy_at(id, 12, Side::No, dec!(80), t0()).await.unwrap();

        let summary = venue.resolve_market_at(id, Side::Yes, ADMIN, t0()).await.unwrap();
        let expected = points_from_f64(a.shares_out * FEE_KEPT).unwrap()
            + points_from_f64(b.shares_out * FEE_KEPT).unwrap();
        assert_eq!(summary.total_paid, expected);
        assert_eq!(summary.winner_count, 2);
        assert_eq!(summary.positions_cleared, 3);

        assert_eq!(
            venue.get_balance(10).await.unwrap(),
            dec!(900) + points_from_f64(a.shares_out * FEE_KEPT).unwrap()
        );
        assert_eq!(venue.get_balance(12).await.unwrap(), dec!(920));
        assert!(venue.get_portfolio(10).await.unwrap().is_empty());

        let err = venue.buy_at(id, 10, Side::Yes, dec!(1), t0()).await.unwrap_err();
        assert!(matches!(err, VenueError::MarketNotActive { .. }));
    }

    #[tokio::test]
    async fn test_portfolio_values_positions() {
        let venue = venue().await;
        let id = open_market(&venue, 24).await;
        venue.buy_at(id, 10, Side::No, dec!(100), t0()).await.unwrap();

        let portfolio = venue.get_portfolio(10).await.unwrap();
        assert_eq!(portfolio.len(), 1);
        let entry = &portfolio[0];
        assert_eq!(entry.side, Side::No);
        assert_eq!(entry.cost_basis, dec!(100));
        assert!(entry.current_value < dec!(95) && entry.current_value > dec!(90));
        assert_eq!(entry.pnl, entry.current_value - dec!(100));
    }

    #[tokio::test]
    async fn test_scan_escalates_undecided_market() {
        let venue = venue().await;
        let id = open_market(&venue, 1).await;

        assert!(venue.scan_expired_at(t0()).await.unwrap().is_empty());

        let reports = venue.scan_expired_at(t0() + Duration::hours(1)).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].market_id, id);
        assert_eq!(reports[0].outcome, ExpiryOutcome::AwaitingResolution);
        assert!((reports[0].prob_yes - 50.0).abs() < 1e-9);

        let market = venue.get_market(id).await.unwrap();
        assert_eq!(market.status, MarketStatus::AwaitingResolution);
        assert!(venue.scan_expired_at(t0() + Duration::hours(2)).await.unwrap().is_empty());

        venue.resolve_market_at(id, Side::No, ADMIN, t0() + Duration::hours(3)).await.unwrap();
    }

    #[tokio::test]
    async fn test_auto_resolution_and_override() {
        let venue = venue().await;
        let id = open_market(&venue, 1).await;
        let buy = venue.buy_at(id, 10, Side::Yes, dec!(300), t0()).await.unwrap();
        assert!(buy.new_prob_yes > 0.7);

        let expired_at = t0() + Duration::hours(2);
        let reports = venue.scan_expired_at(expired_at).await.unwrap();
        assert_eq!(reports[0].outcome, ExpiryOutcome::AutoResolved(Side::Yes));

        let payout = points_from_f64(buy.shares_out * FEE_KEPT).unwrap();
        assert_eq!(venue.get_balance(10).await.unwrap(), dec!(700) + payout);
        let market = venue.get_market(id).await.unwrap();
        assert_eq!(market.status, MarketStatus::AutoResolved);
        assert_eq!(market.result, Some(Side::Yes));

        // Winner spends part of the payout before the appeal
        {
            let mut tx = venue.db.begin().await.unwrap();
            venue.ledger.debit(&mut tx, 10, dec!(700) + payout - dec!(50)).await.unwrap();
            tx.commit().await.unwrap();
        }

        let summary = venue
            .override_auto_resolution_at(id, ADMIN, expired_at + Duration::hours(23))
            .await
            .unwrap();
        assert_eq!(summary.positions_restored, 1);
        assert_eq!(summary.clawed_back, dec!(50));
        assert_eq!(summary.shortfall, payout - dec!(50));
        assert_eq!(venue.get_balance(10).await.unwrap(), Decimal::ZERO);

        let market = venue.get_market(id).await.unwrap();
        assert_eq!(market.status, MarketStatus::AwaitingResolution);
        assert_eq!(market.result, None);
        assert_eq!(venue.get_portfolio(10).await.unwrap()[0].shares, buy.shares_out);

        let summary = venue.resolve_market_at(id, Side::No, ADMIN, expired_at).await.unwrap();
        assert_eq!(summary.total_paid, Decimal::ZERO);
        assert_eq!(summary.positions_cleared, 1);
    }

    #[tokio::test]
    async fn test_expiry_prices_trades_after_listing() {
        let venue = venue().await;
        let id = open_market(&venue, 1).await;
        let expired_at = t0() + Duration::hours(2);

        let listed = {
            let mut conn = venue.db.pool().acquire().await.unwrap();
            venue.markets.list_expired(&mut conn, expired_at).await.unwrap()
        };
        assert_eq!(listed[0].q_yes, 0.0);

        let buy = venue.buy_at(id, 10, Side::Yes, dec!(300), t0()).await.unwrap();
        let report = venue.expire_one(listed[0].id, expired_at).await.unwrap();
        assert_eq!(report.outcome, ExpiryOutcome::AutoResolved(Side::Yes));
        assert!((report.prob_yes - buy.new_prob_yes * 100.0).abs() < 1e-9);

        assert!(matches!(
            venue.expire_one(id, expired_at).await.unwrap_err(),
            VenueError::AlreadyProcessed { status: MarketStatus::AutoResolved, .. }
        ));
    }

    #[tokio::test]
    async fn test_scanner_waits_for_in_flight_trade() {
        let venue = Arc::new(venue().await);
        let id = open_market(&venue, 1).await;
        let expired_at = t0() + Duration::hours(2);

        let guard = venue.locks.acquire(id).await;
        let scan = tokio::spawn({
            let venue = venue.clone();
            async move { venue.scan_expired_at(expired_at).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // Trade placed before close, committing while the scanner is queued
        let buy = {
            let mut tx = venue.db.begin().await.unwrap();
            let receipt = venue
                .coordinator
                .buy(&mut tx, id, 10, Side::Yes, dec!(300), t0())
                .await
                .unwrap();
            tx.commit().await.unwrap();
            receipt
        };
        drop(guard);

        let reports = scan.await.unwrap().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, ExpiryOutcome::AutoResolved(Side::Yes));

        let payout = points_from_f64(buy.shares_out * FEE_KEPT).unwrap();
        assert_eq!(venue.get_balance(10).await.unwrap(), dec!(700) + payout);
    }

    #[tokio::test]
    async fn test_appeal_window_closes() {
        let venue = venue().await;
        let id = open_market(&venue, 1).await;
        venue.buy_at(id, 10, Side::No, dec!(300), t0()).await.unwrap();

        let expired_at = t0() + Duration::hours(1);
        let reports = venue.scan_expired_at(expired_at).await.unwrap();
        assert_eq!(reports[0].outcome, ExpiryOutcome::AutoResolved(Side::No));

        let late = expired_at + Duration::hours(25);
        let err = venue.override_auto_resolution_at(id, ADMIN, late).await.unwrap_err();
        assert!(matches!(err, VenueError::AppealWindowClosed { .. }));

        assert!(venue.finalize_appeals_at(expired_at + Duration::hours(1)).await.unwrap().is_empty());
        assert_eq!(venue.finalize_appeals_at(late).await.unwrap(), vec![id]);
        let market = venue.get_market(id).await.unwrap();
        assert_eq!(market.status, MarketStatus::Closed);
        assert_eq!(market.result, Some(Side::No));

        assert!(matches!(
            venue.confirm_auto_resolution(id, ADMIN).await.unwrap_err(),
            VenueError::AlreadyProcessed { .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_buys_serialize() {
        let venue = Arc::new(venue().await);
        let id = open_market(&venue, 24).await;

        let mut handles = Vec::new();
        for user in 100..120 {
            let venue = venue.clone();
            handles.push(tokio::spawn(async move {
                venue.buy_at(id, user, Side::Yes, dec!(10), t0()).await
            }));
        }

        let mut total_shares = 0.0;
        for handle in handles {
            total_shares += handle.await.unwrap().unwrap().shares_out;
        }

        let market = venue.get_market(id).await.unwrap();
        assert!((market.q_yes - total_shares).abs() < 1e-6);
        assert_eq!(market.fee_collected, dec!(10));
        assert_eq!(venue.price_history(id).await.unwrap().len(), 21);
    }

    #[tokio::test]
    async fn test_daily_claim_and_stats() {
        let venue = venue().await;
        let claim = venue.claim_daily_at(3, t0()).await.unwrap();
        assert_eq!(claim.balance, dec!(1100));
        assert!(matches!(
            venue.claim_daily_at(3, t0() + Duration::hours(2)).await.unwrap_err(),
            VenueError::ClaimCooldown { .. }
        ));

        let id = open_market(&venue, 24).await;
        venue.buy_at(id, 4, Side::Yes, dec!(20), t0()).await.unwrap();

        let stats = venue.venue_stats().await.unwrap();
        assert_eq!(stats.active_markets, 1);
        assert_eq!(stats.total_fees, dec!(1));

        let top = venue.leaderboard(1).await.unwrap();
        assert_eq!(top[0].user_id, 3);
    }
}
