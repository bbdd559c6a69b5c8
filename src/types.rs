//! Core types for the prediction market venue

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type MarketId = i64;
pub type UserId = i64;

/// Decimal places kept for every point amount
pub const POINTS_DP: u32 = 4;

/// Positions holding fewer shares than this are deleted
pub const DUST_SHARES: f64 = 0.01;

/// Round an f64 amount coming out of the LMSR math onto the ledger grid
pub fn points_from_f64(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(POINTS_DP))
}

pub fn points_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Fixed-point storage representation (1 point = 10^POINTS_DP units)
pub fn to_units(value: Decimal) -> i64 {
    let mut scaled = value.round_dp(POINTS_DP);
    scaled.rescale(POINTS_DP);
    i64::try_from(scaled.mantissa()).unwrap_or(if scaled.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

pub fn from_units(units: i64) -> Decimal {
    Decimal::new(units, POINTS_DP).normalize()
}

/// Trading side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "y" => Ok(Side::Yes),
            "no" | "n" => Ok(Side::No),
            other => Err(format!("unknown side: {}", other)),
        }
    }
}

/// Market lifecycle status
///
/// ```text
/// pending -> active -> awaiting_resolution -> closed
///                   -> auto_resolved -> closed
///                                    -> awaiting_resolution (appeal)
///         -> rejected
/// active -> closed (manual resolution)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Pending,
    Active,
    AwaitingResolution,
    AutoResolved,
    Closed,
    Rejected,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Pending => "pending",
            MarketStatus::Active => "active",
            MarketStatus::AwaitingResolution => "awaiting_resolution",
            MarketStatus::AutoResolved => "auto_resolved",
            MarketStatus::Closed => "closed",
            MarketStatus::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(&self, next: MarketStatus) -> bool {
        use MarketStatus::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Rejected)
                | (Active, AwaitingResolution)
                | (Active, AutoResolved)
                | (Active, Closed)
                | (AwaitingResolution, Closed)
                | (AutoResolved, AwaitingResolution)
                | (AutoResolved, Closed)
        )
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MarketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MarketStatus::Pending),
            "active" => Ok(MarketStatus::Active),
            "awaiting_resolution" => Ok(MarketStatus::AwaitingResolution),
            "auto_resolved" => Ok(MarketStatus::AutoResolved),
            "closed" => Ok(MarketStatus::Closed),
            "rejected" => Ok(MarketStatus::Rejected),
            other => Err(format!("unknown market status: {}", other)),
        }
    }
}

/// A market record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub question: String,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub status: MarketStatus,
    pub result: Option<Side>,
    /// Outstanding YES shares (AMM pool state, not cash)
    pub q_yes: f64,
    /// Outstanding NO shares
    pub q_no: f64,
    pub fee_collected: Decimal,
    /// What the creator was actually charged; refunded on reject/withdraw
    pub proposal_cost: Decimal,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
}

impl Market {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.closes_at <= now
    }

    /// Pool values ordered as (target, other) for a trade on `side`
    pub fn pool_for(&self, side: Side) -> (f64, f64) {
        match side {
            Side::Yes => (self.q_yes, self.q_no),
            Side::No => (self.q_no, self.q_yes),
        }
    }

    /// Pool values after the target side's outstanding shares become `new_q_target`
    pub fn pool_with(&self, side: Side, new_q_target: f64) -> (f64, f64) {
        match side {
            Side::Yes => (new_q_target, self.q_no),
            Side::No => (self.q_yes, new_q_target),
        }
    }

    /// Get a shortened question for display (handles UTF-8 properly)
    pub fn short_question(&self, max_len: usize) -> String {
        let chars: Vec<char> = self.question.chars().collect();
        if chars.len() <= max_len {
            self.question.clone()
        } else {
            let truncated: String = chars[..max_len.saturating_sub(3)].iter().collect();
            format!("{}...", truncated)
        }
    }
}

/// Holdings of one user on one side of one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: MarketId,
    pub user_id: UserId,
    pub side: Side,
    pub shares: f64,
    /// Total points spent acquiring the current shares
    pub cost_basis: Decimal,
}

impl Position {
    /// Average price paid per share, for display
    pub fn avg_price(&self) -> f64 {
        if self.shares <= 0.0 {
            0.0
        } else {
            points_to_f64(self.cost_basis) / self.shares
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub balance: Decimal,
    pub last_claim: Option<DateTime<Utc>>,
    pub last_proposal: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryPoint {
    pub market_id: MarketId,
    pub prob_yes: f64,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of a position taken when its market resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub market_id: MarketId,
    pub user_id: UserId,
    pub side: Side,
    pub shares: f64,
    pub cost_basis: Decimal,
    pub payout: Decimal,
    pub settled_at: DateTime<Utc>,
}

/// How many shares a sell request covers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellAmount {
    All,
    Shares(f64),
}

impl SellAmount {
    /// Shell input convention: 0 means "sell everything"
    pub fn from_input(shares: f64) -> Self {
        if shares == 0.0 {
            SellAmount::All
        } else {
            SellAmount::Shares(shares)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyReceipt {
    pub market_id: MarketId,
    pub side: Side,
    pub amount: Decimal,
    pub fee: Decimal,
    pub shares_out: f64,
    pub avg_price: f64,
    pub new_prob_yes: f64,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellReceipt {
    pub market_id: MarketId,
    pub side: Side,
    pub shares_sold: f64,
    pub payout: Decimal,
    pub fee: Decimal,
    pub new_prob_yes: f64,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub market_id: MarketId,
    pub winner: Side,
    pub total_paid: Decimal,
    pub winner_count: usize,
    pub positions_cleared: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "side", rename_all = "snake_case")]
pub enum ExpiryOutcome {
    AutoResolved(Side),
    AwaitingResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryReport {
    pub market_id: MarketId,
    pub prob_yes: f64,
    pub outcome: ExpiryOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideSummary {
    pub market_id: MarketId,
    pub positions_restored: usize,
    pub clawed_back: Decimal,
    /// Payouts that could not be recovered because the winner already spent them
    pub shortfall: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub market_id: MarketId,
    pub question: String,
    pub status: MarketStatus,
    pub side: Side,
    pub shares: f64,
    pub cost_basis: Decimal,
    /// Net proceeds of selling the whole position right now
    pub current_value: Decimal,
    pub pnl: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyClaim {
    pub reward: Decimal,
    pub balance: Decimal,
    pub next_claim_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenueStats {
    pub active_markets: i64,
    pub active_traders: i64,
    pub total_fees: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_units_round_trip_on_grid() {
        assert_eq!(to_units(dec!(1000)), 10_000_000);
        assert_eq!(to_units(dec!(0.00006)), 1);
        assert_eq!(from_units(9_500_000), dec!(950));
        assert_eq!(to_units(dec!(-12.34567)), -123_457);
    }

    #[test]
    fn test_status_transitions() {
        use MarketStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Closed));
        assert!(AutoResolved.can_transition_to(AwaitingResolution));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Rejected.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Closed));
        assert!(!Rejected.can_transition_to(Closed));
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("YES".parse::<Side>().unwrap(), Side::Yes);
        assert_eq!("no".parse::<Side>().unwrap(), Side::No);
        assert!("maybe".parse::<Side>().is_err());
    }

    #[test]
    fn test_sell_amount_zero_means_all() {
        assert_eq!(SellAmount::from_input(0.0), SellAmount::All);
        assert_eq!(SellAmount::from_input(12.5), SellAmount::Shares(12.5));
    }
}
