//! API route handlers

pub mod markets;
pub mod trades;
pub mod users;

use crate::error::VenueError;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

fn error_response(status: StatusCode, error: String) -> ApiError {
    (status, Json(ErrorResponse { error }))
}

/// Map a venue error onto an HTTP status
pub fn venue_error(e: VenueError) -> ApiError {
    let status = match &e {
        VenueError::NotFound(_) => StatusCode::NOT_FOUND,
        VenueError::Forbidden(_) => StatusCode::FORBIDDEN,
        VenueError::AlreadyProcessed { .. }
        | VenueError::MarketNotActive { .. }
        | VenueError::MarketExpired { .. }
        | VenueError::AppealWindowClosed { .. }
        | VenueError::ProposalCooldown { .. }
        | VenueError::ClaimCooldown { .. } => StatusCode::CONFLICT,
        e if e.is_user_error() => StatusCode::BAD_REQUEST,
        _ => {
            error!("Request failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, e.to_string())
}

/// Admin-only endpoints trust the caller's flag
pub fn require_admin(is_admin: bool) -> Result<(), ApiError> {
    if is_admin {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::FORBIDDEN,
            "Admin privileges required".to_string(),
        ))
    }
}
