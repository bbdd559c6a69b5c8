//! Account API endpoints

use super::{venue_error, ApiResult};
use crate::api::server::AppState;
use crate::types::{DailyClaim, LeaderboardEntry, PortfolioEntry, UserId, VenueStats};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: Decimal,
}

/// Portfolio response
#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub user_id: UserId,
    pub positions: Vec<PortfolioEntry>,
    pub total_value: Decimal,
    pub total_pnl: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<BalanceResponse> {
    let balance = state.venue.get_balance(user_id).await.map_err(venue_error)?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<PortfolioResponse> {
    let positions = state.venue.get_portfolio(user_id).await.map_err(venue_error)?;
    let total_value: Decimal = positions.iter().map(|p| p.current_value).sum();
    let total_pnl: Decimal = positions.iter().map(|p| p.pnl).sum();

    Ok(Json(PortfolioResponse {
        user_id,
        positions,
        total_value,
        total_pnl,
    }))
}

pub async fn claim_daily(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> ApiResult<DailyClaim> {
    let claim = state.venue.claim_daily(user_id).await.map_err(venue_error)?;
    Ok(Json(claim))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let entries = state.venue.leaderboard(limit).await.map_err(venue_error)?;
    Ok(Json(entries))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<VenueStats> {
    let stats = state.venue.venue_stats().await.map_err(venue_error)?;
    Ok(Json(stats))
}
