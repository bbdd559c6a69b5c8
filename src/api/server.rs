//! Axum server setup and configuration

use crate::api::routes;
use crate::{Config, Venue};
use anyhow::Result;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub venue: Arc<Venue>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let venue = Venue::open(config).await?;
        Ok(Self::from_venue(Arc::new(venue)))
    }

    pub fn from_venue(venue: Arc<Venue>) -> Self {
        Self { venue }
    }
}

/// Create the Axum application with all routes
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // API routes
    let api_routes = Router::new()
        // Market routes
        .route(
            "/markets",
            get(routes::markets::list_markets).post(routes::markets::propose_market),
        )
        .route("/markets/:id", get(routes::markets::get_market))
        .route("/markets/:id/history", get(routes::markets::get_history))
        .route("/markets/:id/approve", post(routes::markets::approve_market))
        .route("/markets/:id/reject", post(routes::markets::reject_market))
        .route("/markets/:id/withdraw", post(routes::markets::withdraw_proposal))
        .route("/markets/:id/resolve", post(routes::markets::resolve_market))
        .route("/markets/:id/override", post(routes::markets::override_resolution))
        .route("/markets/:id/confirm", post(routes::markets::confirm_resolution))
        // Trade routes
        .route("/markets/:id/buy", post(routes::trades::buy))
        .route("/markets/:id/sell", post(routes::trades::sell))
        // User routes
        .route("/users/:id/balance", get(routes::users::get_balance))
        .route("/users/:id/portfolio", get(routes::users::get_portfolio))
        .route("/users/:id/daily", post(routes::users::claim_daily))
        .route("/leaderboard", get(routes::users::leaderboard))
        .route("/stats", get(routes::users::stats));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let db = Database::in_memory().await.unwrap();
        let venue = Arc::new(Venue::new(db, Config::default()));
        create_app(AppState::from_venue(venue))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_propose_approve_trade_flow() {
        let app = app().await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/markets",
            Some(json!({ "question": "Will the API work?", "duration": 24, "user_id": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["market_id"].as_i64().unwrap();

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/markets/{}/approve", id),
            Some(json!({ "admin_id": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/markets/{}/approve", id),
            Some(json!({ "admin_id": 1, "is_admin": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "active");
        assert_eq!(body["prob_yes"], 0.5);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/markets/{}/buy", id),
            Some(json!({ "user_id": 9, "side": "yes", "amount": "100" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["new_prob_yes"].as_f64().unwrap() > 0.5);

        let (status, body) = call(&app, "GET", "/api/users/9/portfolio", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["positions"].as_array().unwrap().len(), 1);

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/markets/{}/sell", id),
            Some(json!({ "user_id": 9, "side": "no" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app().await;

        let (status, body) = call(&app, "GET", "/api/markets/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let (status, _) = call(&app, "GET", "/api/markets?status=bogus", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "POST", "/api/users/3/daily", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "POST", "/api/users/3/daily", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
