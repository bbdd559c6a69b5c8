//! Per (market, user, side) holdings and cost basis

use crate::db::row_to_position;
use crate::error::{VenueError, VenueResult};
use crate::types::{to_units, MarketId, Position, SettlementRecord, Side, UserId, DUST_SHARES};
use rust_decimal::prelude::*;
use sqlx::SqliteConnection;
use tracing::debug;

/// Position bookkeeping. Stateless; every call runs on the caller's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionBook;

impl PositionBook {
    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
    ) -> VenueResult<Option<Position>> {
        let row = sqlx::query("SELECT * FROM positions WHERE market_id = ? AND user_id = ? AND side = ?")
            .bind(market_id)
            .bind(user_id)
            .bind(side.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.as_ref().map(row_to_position).transpose()?)
    }

    /// Merge a fill into the holding: shares and cost basis both add up
    pub async fn record_buy(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
        shares: f64,
        amount_spent: Decimal,
    ) -> VenueResult<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (market_id, user_id, side, shares, cost_basis)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(market_id, user_id, side) DO UPDATE SET
                shares = shares + excluded.shares,
                cost_basis = cost_basis + excluded.cost_basis
            "#,
        )
        .bind(market_id)
        .bind(user_id)
        .bind(side.as_str())
        .bind(shares)
        .bind(to_units(amount_spent))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Reduce the holding by `shares_sold`. Cost basis shrinks in proportion;
    /// a remainder below the dust threshold deletes the position.
    /// Returns the remaining share count.
    pub async fn record_sell(
        &self,
        conn: &mut SqliteConnection,
        market_id: MarketId,
        user_id: UserId,
        side: Side,
        shares_sold: f64,
    ) -> VenueResult<f64> {
        let position = self.get(conn, market_id, user_id, side).await?;
        let held = position.as_ref().map(|p| p.shares).unwrap_or(0.0);
        let position = match position {
            Some(p) if shares_sold <= p.shares => p,
            _ => {
                return Err(VenueError::InsufficientShares {
                    held,
                    requested: shares_sold,
                })
            }
        };

        let remaining = position.shares - shares_sold;
        if remaining < DUST_SHARES {
            sqlx::query("DELETE FROM positions WHERE market_id = ? AND user_id = ? AND side = ?")
                .bind(market_id)
                .bind(user_id)
                .bind(side.as_str())
                .execute(&mut *conn)
                .await?;
            debug!("Closed position of user {} on market #{} {}", user_id, market_id, side);
            return Ok(0.0);
        }

        let ratio = Decimal::from_f64(remaining / position.shares).unwrap_or(Decimal::ZERO);
        let cost_basis = position.cost_basis * ratio;
        sqlx::query(
            "UPDATE positions SET shares = ?, cost_basis = ? WHERE market_id = ? AND user_id = ? AND side = ?",
        )
        .bind(remaining)
        .bind(to_units(cost_basis))
        .bind(market_id)
        .bind(user_id)
        .bind(side.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(remaining)
    }

    pub async fn list_for_market(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE market_id = ? ORDER BY user_id, side")
            .bind(market_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.iter().map(row_to_position).collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn list_for_user(&self, conn: &mut SqliteConnection, user_id: UserId) -> VenueResult<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE user_id = ? ORDER BY market_id, side")
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.iter().map(row_to_position).collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete every position of the market, returning how many were removed
    pub async fn clear_market(&self, conn: &mut SqliteConnection, market_id: MarketId) -> VenueResult<u64> {
        let result = sqlx::query("DELETE FROM positions WHERE market_id = ?")
            .bind(market_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Put a settled position back exactly as it was before resolution
    pub async fn restore(&self, conn: &mut SqliteConnection, record: &SettlementRecord) -> VenueResult<()> {
        self.record_buy(
            conn,
            record.market_id,
            record.user_id,
            record.side,
            record.shares,
            record.cost_basis,
        )
        .await
    }
}
