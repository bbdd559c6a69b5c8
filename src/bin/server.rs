//! Points Market Web Server
//!
//! JSON API over the venue, with the expiry scanner running in the background.

use anyhow::{Context, Result};
use points_market::api::{create_app, AppState};
use points_market::{Config, ExpiryScanner};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging. Override with RUST_LOG, e.g. RUST_LOG=debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,points_market=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║       POINTS MARKET - WEB SERVER                             ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  LMSR B: {:<51} ║", config.economy.lmsr_b);
    println!(
        "║  Max house loss: {:<43} ║",
        format!("{:.2} points per market", config.pricing().max_house_loss())
    );
    println!("║  Trading fee: {:<46} ║", format!("{:.1}%", config.economy.trading_fee * 100.0));
    println!("║  Time unit: {:<48} ║", config.time.unit.as_str());
    println!(
        "║  Auto-resolve: {:<45} ║",
        if config.resolution.auto_resolve_enabled {
            format!("ON at {:.0}%", config.resolution.threshold)
        } else {
            "OFF".to_string()
        }
    );
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // Create application state
    info!("Initializing application state...");
    let state = AppState::new(config.clone()).await?;

    // Spawn expiry scanner
    let scanner_venue = state.venue.clone();
    let interval = Duration::from_secs(config.resolution.check_interval_seconds);
    tokio::spawn(async move {
        info!("Starting expiry scanner...");
        ExpiryScanner::new(scanner_venue).run(interval).await;
    });

    // Create the Axum app
    let app = create_app(state);

    // Bind to address
    let addr: SocketAddr = config
        .server_addr
        .parse()
        .with_context(|| format!("Invalid SERVER_ADDR: {}", config.server_addr))?;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    println!();
    println!("  API:       http://{}/api", addr);
    println!("  Health:    http://{}/health", addr);
    println!();

    // Run the server
    axum::serve(listener, app).await?;

    Ok(())
}
