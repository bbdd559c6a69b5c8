//! Configuration management for the points market

use crate::pricing::LmsrPricing;
use anyhow::Result;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;

/// Upper bound for any configured window, in hours (ten years)
const MAX_WINDOW_HOURS: f64 = 87_600.0;

/// Longest market a privileged creator may open, in days
const MAX_PRIVILEGED_DAYS: u32 = 3_650;

/// Venue configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database
    pub database_path: String,

    /// Listen address for the HTTP server
    pub server_addr: String,

    /// Point economy and market maker settings
    pub economy: EconomyConfig,

    /// Market durations and cooldowns
    pub time: TimeConfig,

    /// Expiry handling and auto-resolution
    pub resolution: ResolutionConfig,
}

#[derive(Debug, Clone)]
pub struct EconomyConfig {
    /// LMSR liquidity parameter (max house loss per market is B·ln 2)
    pub lmsr_b: f64,
    /// Fee rate charged on buys and sells
    pub trading_fee: f64,
    pub proposal_cost: Decimal,
    pub starting_balance: Decimal,
    pub daily_reward: Decimal,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            lmsr_b: 300.0,
            trading_fee: 0.05,
            proposal_cost: dec!(100),
            starting_balance: dec!(1000),
            daily_reward: dec!(100),
        }
    }
}

/// Unit that market durations are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Hours,
    /// Short cycles for testing a deployment by hand
    Minutes,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Hours => "hours",
            TimeUnit::Minutes => "minutes",
        }
    }

    pub fn per_day(&self) -> u32 {
        match self {
            TimeUnit::Hours => 24,
            TimeUnit::Minutes => 1_440,
        }
    }

    pub fn duration(&self, value: u32) -> Duration {
        match self {
            TimeUnit::Hours => Duration::hours(i64::from(value)),
            TimeUnit::Minutes => Duration::minutes(i64::from(value)),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hours" | "h" => Ok(TimeUnit::Hours),
            "minutes" | "m" => Ok(TimeUnit::Minutes),
            other => anyhow::bail!("Unknown TIME_UNIT: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeConfig {
    pub unit: TimeUnit,
    /// Shortest market a non-privileged user may propose, in `unit`
    pub min_duration: u32,
    /// Longest market a non-privileged user may propose, in `unit`
    pub max_duration: u32,
    pub proposal_cooldown_hours: f64,
    pub daily_cooldown_hours: f64,
}

impl TimeConfig {
    /// Defaults for the given unit
    pub fn for_unit(unit: TimeUnit) -> Self {
        match unit {
            TimeUnit::Hours => Self {
                unit,
                min_duration: 6,
                max_duration: 168,
                proposal_cooldown_hours: 4.0,
                daily_cooldown_hours: 24.0,
            },
            TimeUnit::Minutes => Self {
                unit,
                min_duration: 1,
                max_duration: 120,
                proposal_cooldown_hours: 0.1,
                daily_cooldown_hours: 0.016,
            },
        }
    }

    pub fn proposal_cooldown(&self) -> Duration {
        hours(self.proposal_cooldown_hours)
    }

    pub fn daily_cooldown(&self) -> Duration {
        hours(self.daily_cooldown_hours)
    }

    /// Privileged proposals skip `min_duration..=max_duration` but not this cap
    pub fn privileged_max_duration(&self) -> u32 {
        MAX_PRIVILEGED_DAYS * self.unit.per_day()
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self::for_unit(TimeUnit::Hours)
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    pub auto_resolve_enabled: bool,
    /// Probability (percent) at or above which an expired market resolves itself
    pub threshold: f64,
    /// How long an auto-resolution can still be overridden
    pub appeal_window_hours: f64,
    /// Expiry scanner interval in seconds
    pub check_interval_seconds: u64,
}

impl ResolutionConfig {
    pub fn appeal_window(&self) -> Duration {
        hours(self.appeal_window_hours)
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            auto_resolve_enabled: true,
            threshold: 70.0,
            appeal_window_hours: 24.0,
            check_interval_seconds: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "prediction_market.db".to_string(),
            server_addr: "0.0.0.0:3000".to_string(),
            economy: EconomyConfig::default(),
            time: TimeConfig::default(),
            resolution: ResolutionConfig::default(),
        }
    }
}

fn hours(value: f64) -> Duration {
    Duration::milliseconds((value * 3_600_000.0).round() as i64)
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let database_path = env::var("DATABASE_PATH").unwrap_or(defaults.database_path);
        let server_addr = env::var("SERVER_ADDR").unwrap_or(defaults.server_addr);

        let economy = EconomyConfig {
            lmsr_b: env_or("LMSR_B", defaults.economy.lmsr_b),
            trading_fee: env_or("TRADING_FEE", defaults.economy.trading_fee),
            proposal_cost: env_or("PROPOSAL_COST", defaults.economy.proposal_cost),
            starting_balance: env_or("STARTING_BALANCE", defaults.economy.starting_balance),
            daily_reward: env_or("DAILY_REWARD", defaults.economy.daily_reward),
        };

        let unit = match env::var("TIME_UNIT") {
            Ok(v) if !v.is_empty() => TimeUnit::from_str(&v)?,
            _ => TimeUnit::Hours,
        };
        let base = TimeConfig::for_unit(unit);
        let time = TimeConfig {
            unit,
            min_duration: env_or("MIN_DURATION", base.min_duration),
            max_duration: env_or("MAX_DURATION", base.max_duration),
            proposal_cooldown_hours: env_or("PROPOSAL_COOLDOWN_HOURS", base.proposal_cooldown_hours),
            daily_cooldown_hours: env_or("DAILY_COOLDOWN_HOURS", base.daily_cooldown_hours),
        };

        let resolution = ResolutionConfig {
            auto_resolve_enabled: env::var("AUTO_RESOLVE_ENABLED")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(defaults.resolution.auto_resolve_enabled),
            threshold: env_or("AUTO_RESOLVE_THRESHOLD", defaults.resolution.threshold),
            appeal_window_hours: env_or("APPEAL_WINDOW_HOURS", defaults.resolution.appeal_window_hours),
            check_interval_seconds: env_or(
                "CHECK_EXPIRED_INTERVAL_SECONDS",
                defaults.resolution.check_interval_seconds,
            ),
        };

        let config = Self {
            database_path,
            server_addr,
            economy,
            time,
            resolution,
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the market maker cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.economy.lmsr_b > 0.0 && self.economy.lmsr_b.is_finite()) {
            anyhow::bail!("LMSR_B must be positive, got {}", self.economy.lmsr_b);
        }
        if !(0.0..1.0).contains(&self.economy.trading_fee) {
            anyhow::bail!("TRADING_FEE must be in [0, 1), got {}", self.economy.trading_fee);
        }
        if self.economy.proposal_cost.is_sign_negative()
            || self.economy.starting_balance.is_sign_negative()
            || self.economy.daily_reward.is_sign_negative()
        {
            anyhow::bail!("PROPOSAL_COST, STARTING_BALANCE and DAILY_REWARD must not be negative");
        }
        if !(self.resolution.threshold > 50.0 && self.resolution.threshold <= 100.0) {
            anyhow::bail!(
                "AUTO_RESOLVE_THRESHOLD must be in (50, 100], got {}",
                self.resolution.threshold
            );
        }
        if self.time.min_duration > self.time.max_duration {
            anyhow::bail!(
                "MIN_DURATION ({}) exceeds MAX_DURATION ({})",
                self.time.min_duration,
                self.time.max_duration
            );
        }
        for (key, value) in [
            ("PROPOSAL_COOLDOWN_HOURS", self.time.proposal_cooldown_hours),
            ("DAILY_COOLDOWN_HOURS", self.time.daily_cooldown_hours),
            ("APPEAL_WINDOW_HOURS", self.resolution.appeal_window_hours),
        ] {
            if !(0.0..=MAX_WINDOW_HOURS).contains(&value) {
                anyhow::bail!("{} must be in [0, {}], got {}", key, MAX_WINDOW_HOURS, value);
            }
        }
        if self.resolution.check_interval_seconds == 0 {
            anyhow::bail!("CHECK_EXPIRED_INTERVAL_SECONDS must be at least 1");
        }
        Ok(())
    }

    /// Market maker built from the economy settings
    pub fn pricing(&self) -> LmsrPricing {
        LmsrPricing::new(self.economy.lmsr_b, self.economy.trading_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.time.unit, TimeUnit::Hours);
        assert_eq!(config.time.daily_cooldown(), Duration::hours(24));
        assert_eq!(config.resolution.appeal_window(), Duration::hours(24));
    }

    #[test]
    fn test_minutes_unit_shortens_everything() {
        let time = TimeConfig::for_unit(TimeUnit::Minutes);
        assert_eq!((time.min_duration, time.max_duration), (1, 120));
        assert_eq!(time.proposal_cooldown(), Duration::minutes(6));
        assert_eq!(TimeUnit::Minutes.duration(5), Duration::minutes(5));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.economy.trading_fee = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.resolution.threshold = 50.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.time.min_duration = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_windows() {
        let mut config = Config::default();
        config.resolution.appeal_window_hours = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.time.proposal_cooldown_hours = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.time.daily_cooldown_hours = 1e300;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.resolution.appeal_window_hours = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_privileged_cap_scales_with_unit() {
        assert_eq!(TimeConfig::for_unit(TimeUnit::Hours).privileged_max_duration(), 87_600);
        assert_eq!(
            TimeConfig::for_unit(TimeUnit::Minutes).privileged_max_duration(),
            5_256_000
        );
    }

    #[test]
    fn test_time_unit_parsing() {
        assert_eq!("MINUTES".parse::<TimeUnit>().unwrap(), TimeUnit::Minutes);
        assert!("weeks".parse::<TimeUnit>().is_err());
    }
}
