//! Trade API endpoints

use super::{venue_error, ApiResult};
use crate::api::server::AppState;
use crate::types::{BuyReceipt, MarketId, SellAmount, SellReceipt, Side, UserId};
use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Buy request: spend `amount` points on `side`
#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub user_id: UserId,
    pub side: Side,
    pub amount: Decimal,
}

/// Sell request. Omitted or zero `shares` sells the whole position.
#[derive(Debug, Deserialize)]
pub struct SellRequest {
    pub user_id: UserId,
    pub side: Side,
    pub shares: Option<f64>,
}

pub async fn buy(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
    Json(req): Json<BuyRequest>,
) -> ApiResult<BuyReceipt> {
    let receipt = state
        .venue
        .buy(market_id, req.user_id, req.side, req.amount)
        .await
        .map_err(venue_error)?;
    Ok(Json(receipt))
}

pub async fn sell(
    State(state): State<AppState>,
    Path(market_id): Path<MarketId>,
    Json(req): Json<SellRequest>,
) -> ApiResult<SellReceipt> {
    let amount = SellAmount::from_input(req.shares.unwrap_or(0.0));
    let receipt = state
        .venue
        .sell(market_id, req.user_id, req.side, amount)
        .await
        .map_err(venue_error)?;
    Ok(Json(receipt))
}
