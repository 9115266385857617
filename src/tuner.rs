//! Dynamic parameter tuning
//!
//! Trading parameters are recomputed on a fixed cadence from an immutable
//! base set. Five adjustment passes run in a fixed order (volatility,
//! volume, competition, time of day, recent performance); each pass sees
//! the previous pass's output and clamps the fields it touches.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::shared::types::{CompetitionLevel, MarketCondition};

const MIN_PROFIT_RANGE: (i64, i64) = (10, 200);
const TRADE_SIZE_RANGE: (f64, f64) = (50.0, 10_000.0);
const SLIPPAGE_RANGE: (f64, f64) = (10.0, 500.0);
const SCAN_INTERVAL_RANGE: (u64, u64) = (1_000, 60_000);

/// The mutable parameter set strategies read each cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingParams {
    pub min_profit_bps: i64,
    pub max_trade_size: f64,
    pub slippage_tolerance_bps: f64,
    pub scan_interval_ms: u64,
}

impl Default for TradingParams {
    fn default() -> Self {
        Self {
            min_profit_bps: 30,
            max_trade_size: 1_000.0,
            slippage_tolerance_bps: 50.0,
            scan_interval_ms: 5_000,
        }
    }
}

pub struct ConfigTuner {
    base: TradingParams,
    current: RwLock<TradingParams>,
    last_adjustment: RwLock<Option<Instant>>,
    cadence: Duration,
}

impl ConfigTuner {
    pub fn new(base: TradingParams, cadence: Duration) -> Self {
        Self {
            current: RwLock::new(base.clone()),
            base,
            last_adjustment: RwLock::new(None),
            cadence,
        }
    }

    pub async fn current(&self) -> TradingParams {
        self.current.read().await.clone()
    }

    /// Recomputes the parameter set when the cadence has elapsed. Returns
    /// the fresh set on an adjustment, `None` when still inside the window.
    pub async fn maybe_adjust(&self, condition: &MarketCondition) -> Option<TradingParams> {
        {
            let last = self.last_adjustment.read().await;
            if let Some(at) = *last {
                if at.elapsed() < self.cadence {
                    return None;
                }
            }
        }

        let tuned = Self::retune(&self.base, condition);
        info!(
            "🔧 Parameters retuned: min profit {} bps, max size {:.0}, slippage {:.0} bps, scan {} ms",
            tuned.min_profit_bps,
            tuned.max_trade_size,
            tuned.slippage_tolerance_bps,
            tuned.scan_interval_ms
        );

        *self.current.write().await = tuned.clone();
        *self.last_adjustment.write().await = Some(Instant::now());
        Some(tuned)
    }

    /// Restores the mutable set from the immutable base
    pub async fn reset_to_base(&self) {
        debug!("parameters reset to base values");
        *self.current.write().await = self.base.clone();
        *self.last_adjustment.write().await = None;
    }

    /// Always starts from the base set, never from the previous adjustment
    fn retune(base: &TradingParams, condition: &MarketCondition) -> TradingParams {
        let mut params = base.clone();
        Self::volatility_pass(&mut params, condition.volatility);
        Self::volume_pass(&mut params, condition.volume);
        Self::competition_pass(&mut params, condition.competition);
        Self::time_of_day_pass(&mut params, condition.time_of_day);
        Self::performance_pass(&mut params, condition.recent_performance);
        params
    }

    /// Volatile markets demand more profit per trade, smaller sizes, and a
    /// wider slippage allowance
    fn volatility_pass(params: &mut TradingParams, volatility: f64) {
        params.min_profit_bps =
            clamp_profit(((params.min_profit_bps as f64) * (1.0 + 0.1 * volatility)).round() as i64);
        params.max_trade_size = clamp_size(params.max_trade_size * (1.0 - 0.05 * volatility));
        params.slippage_tolerance_bps =
            clamp_slippage(params.slippage_tolerance_bps * (1.0 + 0.5 * volatility));
    }

    /// Thin volume shrinks sizes and slows scanning, deep volume the reverse
    fn volume_pass(params: &mut TradingParams, volume: f64) {
        let factor = (volume / 500.0).clamp(0.5, 2.0);
        params.max_trade_size = clamp_size(params.max_trade_size * factor);
        params.scan_interval_ms =
            clamp_interval(((params.scan_interval_ms as f64) / factor) as u64);
    }

    /// Heavy competition prices us out of marginal opportunities
    fn competition_pass(params: &mut TradingParams, competition: CompetitionLevel) {
        match competition {
            CompetitionLevel::High => {
                params.min_profit_bps = clamp_profit(params.min_profit_bps + 20);
                params.max_trade_size = clamp_size(params.max_trade_size * 0.8);
            }
            CompetitionLevel::Medium => {}
            CompetitionLevel::Low => {
                params.min_profit_bps = clamp_profit(params.min_profit_bps - 5);
            }
        }
    }

    /// Overnight hours slow down and shrink, busy afternoon hours speed up
    fn time_of_day_pass(params: &mut TradingParams, hour: u32) {
        if hour <= 6 {
            params.scan_interval_ms =
                clamp_interval(((params.scan_interval_ms as f64) * 1.5) as u64);
            params.max_trade_size = clamp_size(params.max_trade_size * 0.9);
        } else if (13..=17).contains(&hour) {
            params.scan_interval_ms =
                clamp_interval(((params.scan_interval_ms as f64) * 0.75) as u64);
        }
    }

    /// A cold streak goes defensive, a hot streak presses the edge
    fn performance_pass(params: &mut TradingParams, recent_performance: f64) {
        if recent_performance < 0.3 {
            params.max_trade_size = clamp_size(params.max_trade_size * 0.5);
            params.min_profit_bps = clamp_profit(params.min_profit_bps + 10);
        } else if recent_performance > 0.7 {
            params.max_trade_size = clamp_size(params.max_trade_size * 1.2);
        }
    }
}

fn clamp_profit(value: i64) -> i64 {
    value.clamp(MIN_PROFIT_RANGE.0, MIN_PROFIT_RANGE.1)
}

fn clamp_size(value: f64) -> f64 {
    value.clamp(TRADE_SIZE_RANGE.0, TRADE_SIZE_RANGE.1)
}

fn clamp_slippage(value: f64) -> f64 {
    value.clamp(SLIPPAGE_RANGE.0, SLIPPAGE_RANGE.1)
}

fn clamp_interval(value: u64) -> u64 {
    value.clamp(SCAN_INTERVAL_RANGE.0, SCAN_INTERVAL_RANGE.1)
}
