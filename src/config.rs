//! TOML configuration surface
//!
//! Every section except `[provider]` is optional and falls back to the
//! built-in defaults, so a minimal config is just a provider URL. Values
//! are validated once at startup; a bad config never reaches the engine.

use serde::Deserialize;
use std::{fs, path::Path};

use crate::shared::errors::ConfigError;
use crate::shared::types::{RiskLimits, TradingPair};
use crate::strategy::RotationMode;
use crate::tuner::TradingParams;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCfg {
    /// Base URL of the quote provider endpoint
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineCfg {
    pub cache_ttl_ms: u64,
    pub optimization_interval_ms: u64,
    pub strategy_switch_interval_ms: u64,
    pub tuning_cadence_ms: u64,
    pub rotation_mode: RotationMode,
    pub forced_strategy: Option<String>,
    pub starting_balance: f64,
    /// Upper bound for the random delay added between cycles
    pub anti_mev_jitter_ms: u64,
    pub triangular_route: [String; 3],
    pub triangular_amount: f64,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 30_000,
            optimization_interval_ms: 300_000,
            strategy_switch_interval_ms: 300_000,
            tuning_cadence_ms: 300_000,
            rotation_mode: RotationMode::Score,
            forced_strategy: None,
            starting_balance: 10_000.0,
            anti_mev_jitter_ms: 250,
            triangular_route: [
                "WETH".to_string(),
                "USDC".to_string(),
                "WBTC".to_string(),
            ],
            triangular_amount: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketCfg {
    /// Pair sampled every cycle to derive volatility
    pub reference_pair: TradingPair,
    pub competitor_count: usize,
}

impl Default for MarketCfg {
    fn default() -> Self {
        Self {
            reference_pair: TradingPair {
                token_in: "WETH".to_string(),
                token_out: "USDC".to_string(),
                amount_in: 1.0,
            },
            competitor_count: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub provider: ProviderCfg,
    #[serde(default)]
    pub engine: EngineCfg,
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default)]
    pub tuning: TradingParams,
    #[serde(default)]
    pub market: MarketCfg,
    #[serde(default = "default_pairs")]
    pub pairs: Vec<TradingPair>,
}

fn default_pairs() -> Vec<TradingPair> {
    vec![TradingPair {
        token_in: "WETH".to_string(),
        token_out: "USDC".to_string(),
        amount_in: 100.0,
    }]
}

impl Config {
    /// Config with every section at its defaults, used when no file is given
    pub fn with_provider(url: String) -> Self {
        Self {
            provider: ProviderCfg { url },
            engine: EngineCfg::default(),
            risk: RiskLimits::default(),
            tuning: TradingParams::default(),
            market: MarketCfg::default(),
            pairs: default_pairs(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::Unreadable(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::Unreadable(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            !self.provider.url.is_empty(),
            "provider.url",
            "must not be empty",
        )?;
        ensure(
            self.engine.starting_balance > 0.0,
            "engine.starting_balance",
            "must be positive",
        )?;
        ensure(
            self.engine.triangular_amount > 0.0,
            "engine.triangular_amount",
            "must be positive",
        )?;
        ensure(
            self.engine.triangular_route.iter().all(|t| !t.is_empty()),
            "engine.triangular_route",
            "token names must not be empty",
        )?;
        let [a, b, c] = &self.engine.triangular_route;
        ensure(
            a != b && b != c && a != c,
            "engine.triangular_route",
            "must visit three distinct tokens",
        )?;

        ensure(
            self.risk.max_daily_loss > 0.0,
            "risk.max_daily_loss",
            "must be positive",
        )?;
        ensure(
            self.risk.max_position_size > 0.0,
            "risk.max_position_size",
            "must be positive",
        )?;
        ensure(
            self.risk.max_portfolio_exposure > 0.0,
            "risk.max_portfolio_exposure",
            "must be positive",
        )?;
        ensure(
            self.risk.max_concurrent_trades >= 1,
            "risk.max_concurrent_trades",
            "must allow at least one trade",
        )?;
        ensure(
            self.risk.stop_loss_threshold_pct > 0.0,
            "risk.stop_loss_threshold_pct",
            "must be positive",
        )?;
        ensure(
            self.risk.max_drawdown_pct > 0.0,
            "risk.max_drawdown_pct",
            "must be positive",
        )?;
        ensure(
            self.risk.daily_volume_limit > 0.0,
            "risk.daily_volume_limit",
            "must be positive",
        )?;

        ensure(
            self.tuning.max_trade_size > 0.0,
            "tuning.max_trade_size",
            "must be positive",
        )?;
        ensure(
            self.tuning.scan_interval_ms > 0,
            "tuning.scan_interval_ms",
            "must be positive",
        )?;

        ensure(
            self.market.reference_pair.amount_in > 0.0,
            "market.reference_pair",
            "probe size must be positive",
        )?;

        if self.pairs.is_empty() {
            return Err(ConfigError::Missing("pairs"));
        }
        for pair in &self.pairs {
            ensure(
                !pair.token_in.is_empty() && !pair.token_out.is_empty(),
                "pairs",
                "token names must not be empty",
            )?;
            ensure(
                pair.amount_in > 0.0,
                "pairs",
                &format!("{} amount must be positive", pair.label()),
            )?;
        }

        Ok(())
    }
}

fn ensure(condition: bool, field: &'static str, reason: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        })
    }
}
