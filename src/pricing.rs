//! LMSR (Logarithmic Market Scoring Rule) pricing engine
//!
//! Pure math over the two outstanding-share counts of a binary market.
//! The cost function is the market maker's potential: a trade is priced as the
//! difference in cost before and after the change in outstanding shares.
//!
//! All values here are `f64`; callers round to the ledger grid at the boundary.

use crate::error::{VenueError, VenueResult};

/// Exponent magnitude beyond which the price is clamped to 0 or 1
const PRICE_CLAMP: f64 = 100.0;

/// LMSR market maker parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmsrPricing {
    /// Liquidity parameter B; larger means prices move less per share
    pub b: f64,
    /// Trading fee rate in [0, 1)
    pub fee: f64,
}

/// Result of pricing a buy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyQuote {
    /// Amount that actually enters the cost function after the fee
    pub net_invested: f64,
    pub fee: f64,
    pub shares_out: f64,
    pub new_q_target: f64,
}

/// Result of pricing a sell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellQuote {
    pub gross_payout: f64,
    pub fee: f64,
    pub net_payout: f64,
    pub new_q_target: f64,
}

impl LmsrPricing {
    pub fn new(b: f64, fee: f64) -> Self {
        debug_assert!(b > 0.0, "liquidity parameter must be positive");
        debug_assert!((0.0..1.0).contains(&fee), "fee must be in [0, 1)");
        Self { b, fee }
    }

    /// Cost function `C(q1, q2) = m + B·ln(e^((q1-m)/B) + e^((q2-m)/B))`, shifted by
    /// `m = max(q1, q2)` so the exponentials never overflow.
    pub fn cost(&self, q1: f64, q2: f64) -> f64 {
        let m = q1.max(q2);
        m + self.b * (((q1 - m) / self.b).exp() + ((q2 - m) / self.b).exp()).ln()
    }

    /// Instantaneous probability of YES, always within [0, 1]
    pub fn price(&self, q_yes: f64, q_no: f64) -> f64 {
        let diff = (q_no - q_yes) / self.b;
        if diff > PRICE_CLAMP {
            return 0.0;
        }
        if diff < -PRICE_CLAMP {
            return 1.0;
        }
        1.0 / (1.0 + diff.exp())
    }

    /// Worst-case loss of the market maker on one market
    pub fn max_house_loss(&self) -> f64 {
        self.b * std::f64::consts::LN_2
    }

    /// Shares received for spending `amount_in` on the target side.
    ///
    /// Solves `C(q_target', q_other) = C(q_target, q_other) + amount_in·(1-fee)` for
    /// `q_target'`. The closed form `B·ln(e^(C'/B) - e^(q_other/B))` is evaluated as
    /// `C' + B·ln(1 - e^((q_other-C')/B))`.
    pub fn buy(&self, q_target: f64, q_other: f64, amount_in: f64) -> VenueResult<BuyQuote> {
        if !amount_in.is_finite() || amount_in <= 0.0 {
            return Err(VenueError::InvalidAmount(format!(
                "amount must be positive, got {}",
                amount_in
            )));
        }

        let net_invested = amount_in * (1.0 - self.fee);
        let new_cost = self.cost(q_target, q_other) + net_invested;

        let x = ((q_other - new_cost) / self.b).exp();
        if !x.is_finite() || x >= 1.0 {
            return Err(VenueError::NumericDomain(format!(
                "non-positive log argument inverting cost {:.6} (q_other {:.6}, B {})",
                new_cost, q_other, self.b
            )));
        }
        let new_q_target = new_cost + self.b * (-x).ln_1p();
        if !new_q_target.is_finite() {
            return Err(VenueError::NumericDomain(format!(
                "non-finite share count inverting cost {:.6}",
                new_cost
            )));
        }

        let shares_out = new_q_target - q_target;
        if shares_out <= 0.0 {
            return Err(VenueError::InvalidAmount("amount too small".to_string()));
        }

        Ok(BuyQuote {
            net_invested,
            fee: amount_in - net_invested,
            shares_out,
            new_q_target,
        })
    }

    /// Proceeds for returning `shares` to the pool on the target side.
    ///
    /// The bound checked here is the pool's outstanding shares, which only guards
    /// the cost function's domain. Holder sufficiency is checked by the position book.
    pub fn sell(&self, q_target: f64, q_other: f64, shares: f64) -> VenueResult<SellQuote> {
        if !shares.is_finite() || shares < 0.0 || shares > q_target {
            return Err(VenueError::InvalidShareAmount {
                requested: shares,
                outstanding: q_target,
            });
        }

        let new_q_target = (q_target - shares).max(0.0);
        let gross_payout = self.cost(q_target, q_other) - self.cost(new_q_target, q_other);
        let fee = gross_payout * self.fee;

        Ok(SellQuote {
            gross_payout,
            fee,
            net_payout: gross_payout - fee,
            new_q_target,
        })
    }
}
