//! SQLite storage for users, markets, positions, price history and settlements
//!
//! Money columns are INTEGER fixed-point units (see [`crate::types::to_units`]),
//! share counts are REAL, timestamps are RFC 3339 TEXT with millisecond precision
//! so they compare lexicographically.

use crate::types::{
    from_units, Market, MarketStatus, Position, PriceHistoryPoint, SettlementRecord, Side,
    UserAccount,
};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use tracing::info;

/// Format a timestamp for storage
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(e.into()))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    value.as_deref().map(parse_ts).transpose()
}

fn parse_side(value: &str) -> Result<Side, sqlx::Error> {
    Side::from_str(value).map_err(|e| sqlx::Error::Decode(e.into()))
}

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    /// Private in-memory database. A single connection that never expires,
    /// since every new connection would see an empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction. Callers issue a write statement first so SQLite takes
    /// the write lock before any validation read; dropping the transaction
    /// without commit rolls everything back.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let table_info: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as("PRAGMA table_info(markets)")
                .fetch_all(&self.pool)
                .await
                .unwrap_or_default();

        if table_info.is_empty() {
            return Ok(());
        }

        let columns = [
            ("proposal_cost", "INTEGER NOT NULL DEFAULT 0"),
            ("resolved_at", "TEXT"),
            ("resolved_by", "INTEGER"),
        ];
        for (column, decl) in columns {
            if !table_info.iter().any(|(_, name, _, _, _, _)| name == column) {
                info!("Migrating markets table: adding {} column", column);
                sqlx::query(&format!("ALTER TABLE markets ADD COLUMN {} {}", column, decl))
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// Initialize database schema
    async fn initialize(&self) -> Result<()> {
        self.run_migrations().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                balance INTEGER NOT NULL,
                last_claim TEXT,
                last_proposal TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS markets (
                market_id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                creator_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                closes_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                result TEXT,
                q_yes REAL NOT NULL DEFAULT 0,
                q_no REAL NOT NULL DEFAULT 0,
                fee_collected INTEGER NOT NULL DEFAULT 0,
                proposal_cost INTEGER NOT NULL DEFAULT 0,
                resolved_at TEXT,
                resolved_by INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                side TEXT NOT NULL,
                shares REAL NOT NULL,
                cost_basis INTEGER NOT NULL,
                UNIQUE (market_id, user_id, side)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id INTEGER NOT NULL,
                prob_yes REAL NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settlements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                side TEXT NOT NULL,
                shares REAL NOT NULL,
                cost_basis INTEGER NOT NULL,
                payout INTEGER NOT NULL,
                settled_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes for fast lookups
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_markets_status_closes ON markets(status, closes_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_user ON positions(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_market ON positions(market_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_price_history_market ON price_history(market_id, timestamp)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_settlements_market ON settlements(market_id)")
            .execute(&self.pool)
            .await?;

        info!("Database initialized");
        Ok(())
    }
}

// ==================== ROW MAPPING ====================

pub(crate) fn row_to_market(row: &SqliteRow) -> Result<Market, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = MarketStatus::from_str(&status_str).map_err(|e| sqlx::Error::Decode(e.into()))?;
    let result: Option<String> = row.try_get("result")?;
    let created_at: String = row.try_get("created_at")?;
    let closes_at: String = row.try_get("closes_at")?;

    Ok(Market {
        id: row.try_get("market_id")?,
        question: row.try_get("question")?,
        creator_id: row.try_get("creator_id")?,
        created_at: parse_ts(&created_at)?,
        closes_at: parse_ts(&closes_at)?,
        status,
        result: result.as_deref().map(parse_side).transpose()?,
        q_yes: row.try_get("q_yes")?,
        q_no: row.try_get("q_no")?,
        fee_collected: from_units(row.try_get("fee_collected")?),
        proposal_cost: from_units(row.try_get("proposal_cost")?),
        resolved_at: parse_opt_ts(row.try_get("resolved_at")?)?,
        resolved_by: row.try_get("resolved_by")?,
    })
}

pub(crate) fn row_to_position(row: &SqliteRow) -> Result<Position, sqlx::Error> {
    let side: String = row.try_get("side")?;
    Ok(Position {
        market_id: row.try_get("market_id")?,
        user_id: row.try_get("user_id")?,
        side: parse_side(&side)?,
        shares: row.try_get("shares")?,
        cost_basis: from_units(row.try_get("cost_basis")?),
    })
}

pub(crate) fn row_to_account(row: &SqliteRow) -> Result<UserAccount, sqlx::Error> {
    Ok(UserAccount {
        user_id: row.try_get("user_id")?,
        balance: from_units(row.try_get("balance")?),
        last_claim: parse_opt_ts(row.try_get("last_claim")?)?,
        last_proposal: parse_opt_ts(row.try_get("last_proposal")?)?,
    })
}

pub(crate) fn row_to_price_point(row: &SqliteRow) -> Result<PriceHistoryPoint, sqlx::Error> {
    let timestamp: String = row.try_get("timestamp")?;
    Ok(PriceHistoryPoint {
        market_id: row.try_get("market_id")?,
        prob_yes: row.try_get("prob_yes")?,
        timestamp: parse_ts(&timestamp)?,
    })
}

pub(crate) fn row_to_settlement(row: &SqliteRow) -> Result<SettlementRecord, sqlx::Error> {
    let side: String = row.try_get("side")?;
    let settled_at: String = row.try_get("settled_at")?;
    Ok(SettlementRecord {
        market_id: row.try_get("market_id")?,
        user_id: row.try_get("user_id")?,
        side: parse_side(&side)?,
        shares: row.try_get("shares")?,
        cost_basis: from_units(row.try_get("cost_basis")?),
        payout: from_units(row.try_get("payout")?),
        settled_at: parse_ts(&settled_at)?,
    })
}
