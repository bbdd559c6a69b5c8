//! Point balances
//!
//! Accounts are created lazily at the starting balance. Every balance change is a
//! single `balance = balance + ?` statement, so concurrent transactions never lose
//! an update. Callers pass the connection of their open transaction.

use crate::config::{EconomyConfig, TimeConfig};
use crate::db::{fmt_ts, row_to_account};
use crate::error::{VenueError, VenueResult};
use crate::types::{from_units, to_units, DailyClaim, LeaderboardEntry, UserAccount, UserId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Ledger {
    starting_balance: Decimal,
    daily_reward: Decimal,
    daily_cooldown: Duration,
}

impl Ledger {
    pub fn new(economy: &EconomyConfig, time: &TimeConfig) -> Self {
        Self {
            starting_balance: economy.starting_balance,
            daily_reward: economy.daily_reward,
            daily_cooldown: time.daily_cooldown(),
        }
    }

    /// Create the account at the starting balance if it does not exist yet
    pub async fn ensure_account(&self, conn: &mut SqliteConnection, user_id: UserId) -> VenueResult<()> {
        let result = sqlx::query("INSERT OR IGNORE INTO users (user_id, balance) VALUES (?, ?)")
            .bind(user_id)
            .bind(to_units(self.starting_balance))
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() > 0 {
            debug!("Created account {} with {} points", user_id, self.starting_balance);
        }
        Ok(())
    }

    pub async fn account(&self, conn: &mut SqliteConnection, user_id: UserId) -> VenueResult<UserAccount> {
        self.ensure_account(conn, user_id).await?;
        let row = sqlx::query("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(row_to_account(&row)?)
    }

    pub async fn get_balance(&self, conn: &mut SqliteConnection, user_id: UserId) -> VenueResult<Decimal> {
        Ok(self.account(conn, user_id).await?.balance)
    }

    /// Add `amount` (negative to subtract) and return the new balance.
    /// Does not check sufficiency; debits go through [`Ledger::debit`].
    pub async fn apply_delta(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Decimal,
    ) -> VenueResult<Decimal> {
        self.ensure_account(conn, user_id).await?;
        let row = sqlx::query("UPDATE users SET balance = balance + ? WHERE user_id = ? RETURNING balance")
            .bind(to_units(amount))
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(from_units(row.try_get("balance")?))
    }

    /// Subtract `amount`, failing with `InsufficientFunds` if the balance cannot cover it
    pub async fn debit(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        amount: Decimal,
    ) -> VenueResult<Decimal> {
        let balance = self.get_balance(conn, user_id).await?;
        if balance < amount {
            return Err(VenueError::InsufficientFunds {
                balance,
                required: amount,
            });
        }

        let units = to_units(amount);
        let row = sqlx::query(
            "UPDATE users SET balance = balance - ? WHERE user_id = ? AND balance >= ? RETURNING balance",
        )
        .bind(units)
        .bind(user_id)
        .bind(units)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(from_units(row.try_get("balance")?)),
            None => Err(VenueError::InsufficientFunds {
                balance,
                required: amount,
            }),
        }
    }

    /// Credit the daily reward if the cooldown since the last claim has elapsed
    pub async fn claim_daily(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> VenueResult<DailyClaim> {
        let account = self.account(conn, user_id).await?;
        if let Some(last) = account.last_claim {
            let ready_at = last + self.daily_cooldown;
            if now < ready_at {
                return Err(VenueError::ClaimCooldown { ready_at });
            }
        }

        let row = sqlx::query(
            "UPDATE users SET balance = balance + ?, last_claim = ? WHERE user_id = ? RETURNING balance",
        )
        .bind(to_units(self.daily_reward))
        .bind(fmt_ts(now))
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        let balance = from_units(row.try_get("balance")?);

        info!("User {} claimed daily reward of {} points", user_id, self.daily_reward);
        Ok(DailyClaim {
            reward: self.daily_reward,
            balance,
            next_claim_at: now + self.daily_cooldown,
        })
    }

    /// Record (or clear) the time of the user's last market proposal
    pub async fn set_last_proposal(
        &self,
        conn: &mut SqliteConnection,
        user_id: UserId,
        at: Option<DateTime<Utc>>,
    ) -> VenueResult<()> {
        self.ensure_account(conn, user_id).await?;
        sqlx::query("UPDATE users SET last_proposal = ? WHERE user_id = ?")
            .bind(at.map(fmt_ts))
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn leaderboard(&self, conn: &mut SqliteConnection, limit: i64) -> VenueResult<Vec<LeaderboardEntry>> {
        let rows = sqlx::query("SELECT user_id, balance FROM users ORDER BY balance DESC, user_id ASC LIMIT ?")
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(LeaderboardEntry {
                user_id: row.try_get("user_id")?,
                balance: from_units(row.try_get("balance")?),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ledger() -> Ledger {
        Ledger::new(&EconomyConfig::default(), &TimeConfig::default())
    }

    #[tokio::test]
    async fn test_lazy_account_creation_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        let ledger = ledger();
        let mut tx = db.begin().await.unwrap();

        assert_eq!(ledger.get_balance(&mut tx, 42).await.unwrap(), dec!(1000));
        ledger.apply_delta(&mut tx, 42, dec!(-250.5)).await.unwrap();
        assert_eq!(ledger.get_balance(&mut tx, 42).await.unwrap(), dec!(749.5));
    }

    #[tokio::test]
    async fn test_debit_checks_sufficiency() {
        let db = Database::in_memory().await.unwrap();
        let ledger = ledger();
        let mut tx = db.begin().await.unwrap();

        let err = ledger.debit(&mut tx, 1, dec!(1000.0001)).await.unwrap_err();
        assert!(matches!(err, VenueError::InsufficientFunds { .. }));
        assert_eq!(ledger.get_balance(&mut tx, 1).await.unwrap(), dec!(1000));

        let balance = ledger.debit(&mut tx, 1, dec!(1000)).await.unwrap();
        assert_eq!(balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_daily_claim_cooldown() {
        let db = Database::in_memory().await.unwrap();
        let ledger = ledger();
        let mut tx = db.begin().await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let claim = ledger.claim_daily(&mut tx, 5, now).await.unwrap();
        assert_eq!(claim.balance, dec!(1100));

        let err = ledger
            .claim_daily(&mut tx, 5, now + Duration::hours(23))
            .await
            .unwrap_err();
        match err {
            VenueError::ClaimCooldown { ready_at } => assert_eq!(ready_at, claim.next_claim_at),
            other => panic!("unexpected error: {other}"),
        }

        let again = ledger
            .claim_daily(&mut tx, 5, now + Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(again.balance, dec!(1200));
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_balance() {
        let db = Database::in_memory().await.unwrap();
        let ledger = ledger();
        let mut tx = db.begin().await.unwrap();

        ledger.apply_delta(&mut tx, 1, dec!(-100)).await.unwrap();
        ledger.apply_delta(&mut tx, 2, dec!(500)).await.unwrap();
        ledger.ensure_account(&mut tx, 3).await.unwrap();

        let top = ledger.leaderboard(&mut tx, 2).await.unwrap();
        let ids: Vec<UserId> = top.iter().map(|e| e.user_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(top[0].balance, dec!(1500));
    }
}
