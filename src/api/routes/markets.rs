//! Market API endpoints: listing, proposals and the admin lifecycle

use super::{require_admin, venue_error, ApiResult};
use crate::api::server::AppState;
use crate::types::{
    Market, MarketId, MarketStatus, OverrideSummary, PriceHistoryPoint, ResolutionSummary, Side,
    UserId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const DEFAULT_LIST_LIMIT: i64 = 50;

/// Query parameters for listing markets
#[derive(Debug, Deserialize)]
pub struct ListMarketsQuery {
    /// Filter by status, e.g. "active" or "awaiting_resolution"
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// A market with its current price
#[derive(Debug, Serialize)]
pub struct MarketView {
    #[serde(flatten)]
    pub market: Market,
    pub prob_yes: f64,
}

#[derive(Debug, Serialize)]
pub struct MarketsResponse {
    pub markets: Vec<MarketView>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub market_id: MarketId,
    pub history: Vec<PriceHistoryPoint>,
}

#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub question: String,
    /// Length of the market in the configured time unit
    pub duration: u32,
    pub user_id: UserId,
    #[serde(default)]
    pub is_privileged: bool,
}

#[derive(Debug, Serialize)]
pub struct ProposeResponse {
    pub market_id: MarketId,
}

#[derive(Debug, Deserialize)]
pub struct AdminRequest {
    pub admin_id: UserId,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub admin_id: UserId,
    #[serde(default)]
    pub is_admin: bool,
    pub winner: Side,
}

fn view(state: &AppState, market: Market) -> MarketView {
    let prob_yes = state.venue.prob_yes(&market);
    MarketView { market, prob_yes }
}

/// List markets, newest first
pub async fn list_markets(
    State(state): State<AppState>,
    Query(query): Query<ListMarketsQuery>,
) -> ApiResult<MarketsResponse> {
    let status = match query.status.as_deref() {
        None | Some("all") => None,
        Some(s) => Some(MarketStatus::from_str(s).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(super::ErrorResponse { error: e }),
            )
        })?),
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);

    let markets = state
        .venue
        .list_markets(status, limit)
        .await
        .map_err(venue_error)?;
    let markets: Vec<MarketView> = markets.into_iter().map(|m| view(&state, m)).collect();
    let total = markets.len();

    Ok(Json(MarketsResponse { markets, total }))
}

pub async fn get_market(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
) -> ApiResult<MarketView> {
    let market = state.venue.get_market(market_id).await.map_err(venue_error)?;
    Ok(Json(view(&state, market)))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
) -> ApiResult<HistoryResponse> {
    let history = state
        .venue
        .price_history(market_id)
        .await
        .map_err(venue_error)?;
    Ok(Json(HistoryResponse { market_id, history }))
}

pub async fn propose_market(
    State(state): State<AppState>,
    Json(req): Json<ProposeRequest>,
) -> ApiResult<ProposeResponse> {
    let market_id = state
        .venue
        .propose_market(&req.question, req.duration, req.user_id, req.is_privileged)
        .await
        .map_err(venue_error)?;
    Ok(Json(ProposeResponse { market_id }))
}

pub async fn approve_market(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<MarketView> {
    require_admin(req.is_admin)?;
    let market = state
        .venue
        .approve_market(market_id, req.admin_id)
        .await
        .map_err(venue_error)?;
    Ok(Json(view(&state, market)))
}

pub async fn reject_market(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<MarketView> {
    require_admin(req.is_admin)?;
    let market = state
        .venue
        .reject_market(market_id, req.admin_id)
        .await
        .map_err(venue_error)?;
    Ok(Json(view(&state, market)))
}

/// Creator takes back a pending proposal (full refund)
pub async fn withdraw_proposal(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
    Json(req): Json<WithdrawRequest>,
) -> ApiResult<Market> {
    let market = state
        .venue
        .withdraw_proposal(market_id, req.user_id)
        .await
        .map_err(venue_error)?;
    Ok(Json(market))
}

pub async fn resolve_market(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<ResolutionSummary> {
    require_admin(req.is_admin)?;
    let summary = state
        .venue
        .resolve_market(market_id, req.winner, req.admin_id)
        .await
        .map_err(venue_error)?;
    Ok(Json(summary))
}

pub async fn override_resolution(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<OverrideSummary> {
    require_admin(req.is_admin)?;
    let summary = state
        .venue
        .override_auto_resolution(market_id, req.admin_id)
        .await
        .map_err(venue_error)?;
    Ok(Json(summary))
}

pub async fn confirm_resolution(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<MarketView> {
    require_admin(req.is_admin)?;
    let market = state
        .venue
        .confirm_auto_resolution(market_id, req.admin_id)
        .await
        .map_err(venue_error)?;
    Ok(Json(view(&state, market)))
}
