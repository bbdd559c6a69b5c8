//! Trade execution against the market maker
//!
//! A trade is validated, priced from the current pool and committed across the
//! ledger, the market pool, the position book and the price history inside the
//! caller's transaction. The caller holds the market's lock for the whole call.

use crate::error::{VenueError, VenueResult};
use crate::ledger::Ledger;
use crate::markets::MarketStore;
use crate::positions::PositionBook;
use crate::pricing::LmsrPricing;
use crate::types::{
    points_from_f64, BuyReceipt, Market, MarketId, MarketStatus, SellAmount, SellReceipt, Side,
    UserId, DUST_SHARES, POINTS_DP,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use sqlx::SqliteConnection;
use tracing::{error, info};

/// Float noise tolerated when a holding slightly exceeds the pool's outstanding shares
const POOL_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct TradeCoordinator {
    pricing: LmsrPricing,
    ledger: Ledger,
    positions: PositionBook,
    markets: MarketStore,
}

fn to_points(value: f64, what: &str) -> VenueResult<Decimal> {
    points_from_f64(value)
        .ok_or_else(|| VenueError::NumericDomain(format!("{} is not a finite amount: {}", what, value)))
}

impl TradeCoordinator {
    pub fn new(pricing: LmsrPricing, ledger: Ledger, markets: MarketStore) -> Self {
        Self {
            pricing,
            ledger,
            positions: PositionBook,
            markets,
        }
    }

    /// Market must exist, be active and not past its close time
    fn check_tradable(market: &Market, now: DateTime<Utc>) -> VenueResult<()> {
        if market.status != MarketStatus::Active {
            return Err(VenueError::MarketNotActive {
                market_id: market.id,
                status: market.status,
            });
        }
        if market.is_expired(now) {
            return Err(VenueError::MarketExpired { market_id: market.id });
        }
        Ok(())
    }

    /// Spend `amount` points on `side`
    pub async fn buy(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> VenueResult<BuyReceipt> {
        // First write of the transaction
        self.ledger.ensure_account(conn, user_id).await?;

        let market = self.markets.require(conn, market_id).await?;
        Self::check_tradable(&market, now)?;

        let amount = amount.round_dp(POINTS_DP);
        if amount <= Decimal::ZERO {
            return Err(VenueError::InvalidAmount(format!(
                "amount must be positive, got {}",
                amount
            )));
        }

        let balance = self.ledger.get_balance(conn, user_id).await?;
        if balance < amount {
            return Err(VenueError::InsufficientFunds {
                balance,
                required: amount,
            });
        }

        let (q_target, q_other) = market.pool_for(side);
        let quote = self
            .pricing
            .buy(q_target, q_other, amount.to_f64().unwrap_or(0.0))
            .inspect_err(|e| {
                if let VenueError::NumericDomain(_) = e {
                    error!("Buy on market #{} failed in pricing: {}", market_id, e);
                }
            })?;
        // A fill below dust could never be sold back
        if quote.shares_out < DUST_SHARES {
            return Err(VenueError::InvalidAmount(format!(
                "amount too small: {} points buys {:.6} shares, minimum {}",
                amount, quote.shares_out, DUST_SHARES
            )));
        }

        let fee_rate = Decimal::from_f64(self.pricing.fee).unwrap_or(Decimal::ZERO);
        let fee = (amount * fee_rate).round_dp(POINTS_DP);
        let pool = market.pool_with(side, quote.new_q_target);
        let new_prob_yes = self.pricing.price(pool.0, pool.1);

        let balance = self.ledger.debit(conn, user_id, amount).await?;
        self.markets.update_pool(conn, market_id, pool, fee).await?;
        self.positions
            .record_buy(conn, market_id, user_id, side, quote.shares_out, amount)
            .await?;
        self.markets
            .append_price(conn, market_id, new_prob_yes, now)
            .await?;

        info!(
            "User {} bought {:.2} {} shares on market #{} for {} points (prob {:.1}%)",
            user_id,
            quote.shares_out,
            side,
            market_id,
            amount,
            new_prob_yes * 100.0
        );

        Ok(BuyReceipt {
            market_id,
            side,
            amount,
            fee,
            shares_out: quote.shares_out,
            avg_price: amount.to_f64().unwrap_or(0.0) / quote.shares_out,
            new_prob_yes,
            balance,
        })
    }

    /// Return shares to the pool. Allowed while the market is active and open, and
    /// during the sell-only window after expiry while it awaits resolution.
    pub async fn sell(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
        amount: SellAmount,
        now: DateTime<Utc>,
    ) -> VenueResult<SellReceipt> {
        self.ledger.ensure_account(conn, user_id).await?;

        let market = self.markets.require(conn, market_id).await?;
        if market.status != MarketStatus::AwaitingResolution {
            Self::check_tradable(&market, now)?;
        }

        let held = self
            .positions
            .get(conn, market_id, user_id, side)
            .await?
            .map(|p| p.shares)
            .unwrap_or(0.0);

        let shares = match amount {
            SellAmount::All => held,
            SellAmount::Shares(s) => s,
        };
        if !shares.is_finite() || shares < DUST_SHARES {
            if amount == SellAmount::All {
                return Err(VenueError::InsufficientShares { held, requested: shares });
            }
            return Err(VenueError::InvalidAmount(format!(
                "must sell at least {} shares, got {}",
                DUST_SHARES, shares
            )));
        }
        if shares > held {
            return Err(VenueError::InsufficientShares { held, requested: shares });
        }

        let (q_target, q_other) = market.pool_for(side);
        let pool_shares = if shares > q_target && shares - q_target < POOL_EPSILON {
            q_target
        } else {
            shares
        };
        let quote = self.pricing.sell(q_target, q_other, pool_shares)?;

        let payout = to_points(quote.net_payout, "sell payout")?;
        let fee = to_points(quote.fee, "sell fee")?;
        let pool = market.pool_with(side, quote.new_q_target);
        let new_prob_yes = self.pricing.price(pool.0, pool.1);

        let balance = self.ledger.apply_delta(conn, user_id, payout).await?;
        self.markets.update_pool(conn, market_id, pool, fee).await?;
        self.positions
            .record_sell(conn, market_id, user_id, side, shares)
            .await?;
        self.markets
            .append_price(conn, market_id, new_prob_yes, now)
            .await?;

        info!(
            "User {} sold {:.2} {} shares on market #{} for {} points (prob {:.1}%)",
            user_id,
            shares,
            side,
            market_id,
            payout,
            new_prob_yes * 100.0
        );

        Ok(SellReceipt {
            market_id,
            side,
            shares_sold: shares,
            payout,
            fee,
            new_prob_yes,
            balance,
        })
    }
}
