//! Points Market CLI
//!
//! Operator shell over the venue: proposals, trades, resolution and the expiry loop.

use anyhow::Result;
use clap::{Parser, Subcommand};
use points_market::types::{ExpiryOutcome, MarketStatus};
use points_market::{Config, ExpiryScanner, SellAmount, Side, Venue};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "points-market")]
#[command(about = "Points-based prediction market with an LMSR market maker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Propose a new market
    Propose {
        /// The yes/no question
        question: String,

        /// Duration in the configured time unit
        #[arg(short, long)]
        duration: u32,

        /// Proposing user
        #[arg(short, long)]
        user: i64,

        /// Skip cost, duration bounds and cooldown
        #[arg(long)]
        privileged: bool,
    },

    /// Approve a pending market
    Approve {
        market: i64,
        #[arg(short, long)]
        admin: i64,
    },

    /// Reject a pending market and refund its creator
    Reject {
        market: i64,
        #[arg(short, long)]
        admin: i64,
    },

    /// Withdraw your own pending proposal
    Withdraw {
        market: i64,
        #[arg(short, long)]
        user: i64,
    },

    /// Buy shares with points
    Buy {
        market: i64,
        side: Side,
        amount: Decimal,
        #[arg(short, long)]
        user: i64,
    },

    /// Sell shares (0 sells everything)
    Sell {
        market: i64,
        side: Side,
        #[arg(default_value = "0")]
        shares: f64,
        #[arg(short, long)]
        user: i64,
    },

    /// Resolve a market and pay out the winners
    Resolve {
        market: i64,
        side: Side,
        #[arg(short, long)]
        admin: i64,
    },

    /// Reopen an auto-resolved market within its appeal window
    Override {
        market: i64,
        #[arg(short, long)]
        admin: i64,
    },

    /// Confirm an auto-resolution
    Confirm {
        market: i64,
        #[arg(short, long)]
        admin: i64,
    },

    /// Process expired markets once
    Scan,

    /// Show a user's open positions
    Portfolio { user: i64 },

    /// Show a user's balance
    Balance { user: i64 },

    /// Claim the daily reward
    Daily { user: i64 },

    /// Show the richest users
    Top {
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Show a market
    Info { market: i64 },

    /// List markets
    Markets {
        /// Filter by status (pending, active, awaiting_resolution, auto_resolved, closed, rejected)
        #[arg(short, long)]
        status: Option<MarketStatus>,

        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Run the expiry scanner continuously
    Run {
        /// Scan interval in seconds (defaults to CHECK_EXPIRED_INTERVAL_SECONDS)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let venue = Venue::open(config).await?;

    match cli.command {
        Commands::Propose { question, duration, user, privileged } => {
            let id = venue.propose_market(&question, duration, user, privileged).await?;
            println!("Market #{} proposed, waiting for approval", id);
        }
        Commands::Approve { market, admin } => {
            venue.approve_market(market, admin).await?;
            println!("Market #{} is now active", market);
        }
        Commands::Reject { market, admin } => {
            let m = venue.reject_market(market, admin).await?;
            println!("Market #{} rejected, refunded {} to user {}", market, m.proposal_cost, m.creator_id);
        }
        Commands::Withdraw { market, user } => {
            let m = venue.withdraw_proposal(market, user).await?;
            println!("Market #{} withdrawn, refunded {}", market, m.proposal_cost);
        }
        Commands::Buy { market, side, amount, user } => {
            let r = venue.buy(market, user, side, amount).await?;
            println!(
                "Bought {:.2} {} shares for {} (fee {}) | avg {:.3} | YES now {:.1}% | balance {}",
                r.shares_out,
                side,
                r.amount,
                r.fee,
                r.avg_price,
                r.new_prob_yes * 100.0,
                r.balance
            );
        }
        Commands::Sell { market, side, shares, user } => {
            let r = venue.sell(market, user, side, SellAmount::from_input(shares)).await?;
            println!(
                "Sold {:.2} {} shares for {} (fee {}) | YES now {:.1}% | balance {}",
                r.shares_sold,
                side,
                r.payout,
                r.fee,
                r.new_prob_yes * 100.0,
                r.balance
            );
        }
        Commands::Resolve { market, side, admin } => {
            let s = venue.resolve_market(market, side, admin).await?;
            println!(
                "Market #{} resolved {}: paid {} to {} winners ({} positions cleared)",
                market, s.winner, s.total_paid, s.winner_count, s.positions_cleared
            );
        }
        Commands::Override { market, admin } => {
            let s = venue.override_auto_resolution(market, admin).await?;
            println!(
                "Market #{} reopened: {} positions restored, {} clawed back, {} unrecovered",
                market, s.positions_restored, s.clawed_back, s.shortfall
            );
        }
        Commands::Confirm { market, admin } => {
            venue.confirm_auto_resolution(market, admin).await?;
            println!("Market #{} closed", market);
        }
        Commands::Scan => scan_once(venue).await?,
        Commands::Portfolio { user } => show_portfolio(&venue, user).await?,
        Commands::Balance { user } => {
            println!("User {} balance: {} points", user, venue.get_balance(user).await?);
        }
        Commands::Daily { user } => {
            let c = venue.claim_daily(user).await?;
            println!(
                "Claimed {} points, balance {} | next claim at {}",
                c.reward,
                c.balance,
                c.next_claim_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        Commands::Top { limit } => show_leaderboard(&venue, limit).await?,
        Commands::Info { market } => show_market(&venue, market).await?,
        Commands::Markets { status, limit } => list_markets(&venue, status, limit).await?,
        Commands::Run { interval } => run_scanner(venue, interval).await,
    }

    Ok(())
}

async fn scan_once(venue: Venue) -> Result<()> {
    let scanner = ExpiryScanner::new(Arc::new(venue));
    let pass = scanner.run_once().await?;

    if pass.expired.is_empty() && pass.finalized.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }
    for report in &pass.expired {
        match report.outcome {
            ExpiryOutcome::AutoResolved(side) => println!(
                "  #{} auto-resolved {} at {:.1}%",
                report.market_id, side, report.prob_yes
            ),
            ExpiryOutcome::AwaitingResolution => println!(
                "  #{} awaiting admin resolution ({:.1}%)",
                report.market_id, report.prob_yes
            ),
        }
    }
    for id in &pass.finalized {
        println!("  #{} appeal window elapsed, closed", id);
    }
    Ok(())
}

async fn run_scanner(venue: Venue, interval: Option<u64>) {
    let seconds = interval.unwrap_or(venue.config().resolution.check_interval_seconds);

    println!("\n{}", "=".repeat(70));
    println!("  EXPIRY SCANNER");
    println!(
        "  Interval: {}s | Auto-resolve: {} at {:.0}%",
        seconds,
        if venue.config().resolution.auto_resolve_enabled { "ON" } else { "OFF" },
        venue.config().resolution.threshold
    );
    println!(
        "  LMSR B: {} | Max house loss per market: {:.2}",
        venue.config().economy.lmsr_b,
        venue.config().pricing().max_house_loss()
    );
    println!("{}\n", "=".repeat(70));

    info!("Starting expiry loop (Ctrl+C to stop)...");
    let scanner = ExpiryScanner::new(Arc::new(venue));
    scanner.run(Duration::from_secs(seconds.max(1))).await;
}

async fn show_portfolio(venue: &Venue, user: i64) -> Result<()> {
    let positions = venue.get_portfolio(user).await?;
    let balance = venue.get_balance(user).await?;

    println!("\n{}", "=".repeat(70));
    println!("  PORTFOLIO - user {} | balance {}", user, balance);
    println!("{}\n", "=".repeat(70));

    if positions.is_empty() {
        println!("No open positions.\n");
        return Ok(());
    }

    let mut total_value = Decimal::ZERO;
    let mut total_pnl = Decimal::ZERO;
    for p in &positions {
        println!(
            "#{} {} {:.2} shares | cost {} | value {} | PnL {} - {}",
            p.market_id,
            p.side,
            p.shares,
            p.cost_basis,
            p.current_value,
            p.pnl,
            p.question.chars().take(50).collect::<String>()
        );
        total_value += p.current_value;
        total_pnl += p.pnl;
    }
    println!("\n{}", "-".repeat(70));
    println!("Total value: {} | Total PnL: {}\n", total_value, total_pnl);
    Ok(())
}

async fn show_leaderboard(venue: &Venue, limit: i64) -> Result<()> {
    let entries = venue.leaderboard(limit).await?;
    println!("\nLEADERBOARD");
    println!("{}", "-".repeat(40));
    for (i, e) in entries.iter().enumerate() {
        println!("{:>3}. user {:<16} {:>12}", i + 1, e.user_id, e.balance.round_dp(2));
    }
    println!();
    Ok(())
}

async fn show_market(venue: &Venue, market_id: i64) -> Result<()> {
    let market = venue.get_market(market_id).await?;
    let history = venue.price_history(market_id).await?;
    let prob = venue.prob_yes(&market) * 100.0;

    println!("\n#{} \"{}\"", market.id, market.question);
    println!("   Status: {} | Creator: {}", market.status, market.creator_id);
    println!("   YES {:.1}% | NO {:.1}%", prob, 100.0 - prob);
    println!(
        "   Pool: {:.2} YES / {:.2} NO | Fees: {}",
        market.q_yes, market.q_no, market.fee_collected
    );
    println!("   Closes: {}", market.closes_at.format("%Y-%m-%d %H:%M UTC"));
    if let Some(result) = market.result {
        println!("   Result: {}", result);
    }
    println!("   Trades: {}\n", history.len().saturating_sub(1));
    Ok(())
}

async fn list_markets(venue: &Venue, status: Option<MarketStatus>, limit: i64) -> Result<()> {
    let markets = venue.list_markets(status, limit).await?;
    if markets.is_empty() {
        println!("No markets found.");
        return Ok(());
    }
    for m in &markets {
        println!(
            "#{:<5} {:<20} YES {:>5.1}% - {}",
            m.id,
            m.status,
            venue.prob_yes(m) * 100.0,
            m.short_question(50)
        );
    }
    Ok(())
}
