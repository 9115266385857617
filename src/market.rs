//! Market condition sampling
//!
//! Conditions are derived from repeated reference-pair quotes. The feed
//! quotes the provider directly rather than through the cache, so every
//! sample reflects a live price.

use async_trait::async_trait;
use chrono::{Timelike, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::math;
use crate::quotes::provider::QuoteProvider;
use crate::shared::errors::MarketDataError;
use crate::shared::types::{CompetitionLevel, MarketCondition, TradingPair};
use crate::shared::utils;

/// Mid fee tier used for reference-price sampling
const REFERENCE_TIER: u32 = 3_000;

/// Volatility needs this many samples before it means anything
const MIN_SAMPLES: usize = 3;

/// Mid prices retained for the volatility window
const WINDOW_CAP: usize = 20;

/// Supplies the per-tick market snapshot
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    async fn sample(&self) -> Result<MarketCondition, MarketDataError>;
}

/// Derives volatility from a rolling window of reference-pair prices and
/// volume from quoted pool depth. Competition comes from the configured
/// competitor count, which changes rarely.
pub struct PriceSampleFeed {
    provider: Arc<dyn QuoteProvider>,
    reference_pair: TradingPair,
    competitor_count: usize,
    window: Mutex<VecDeque<f64>>,
}

impl PriceSampleFeed {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        reference_pair: TradingPair,
        competitor_count: usize,
    ) -> Self {
        Self {
            provider,
            reference_pair,
            competitor_count,
            window: Mutex::new(VecDeque::new()),
        }
    }

    fn competition_for(count: usize) -> CompetitionLevel {
        match count {
            0 => CompetitionLevel::Low,
            1..=2 => CompetitionLevel::Medium,
            _ => CompetitionLevel::High,
        }
    }
}

#[async_trait]
impl MarketDataFeed for PriceSampleFeed {
    /// Fails with `Stale` until enough samples accumulate or when the
    /// provider is unreachable; the caller falls back to safe defaults.
    async fn sample(&self) -> Result<MarketCondition, MarketDataError> {
        let quote = self
            .provider
            .quote(
                &self.reference_pair.token_in,
                &self.reference_pair.token_out,
                self.reference_pair.amount_in,
                REFERENCE_TIER,
            )
            .await
            .map_err(|e| MarketDataError::Stale(e.to_string()))?;

        let (volatility, samples, tick_move_pct) = {
            let mut window = self.window.lock().await;
            let price = quote.implied_price();
            let tick_move_pct = window
                .back()
                .map(|&last| utils::percentage_change(last, price))
                .unwrap_or(0.0);
            window.push_back(price);
            while window.len() > WINDOW_CAP {
                window.pop_front();
            }

            let prices: Vec<f64> = window.iter().copied().collect();
            let mean = prices.iter().sum::<f64>() / prices.len() as f64;
            let volatility = if mean > 0.0 {
                math::stddev(&prices) / mean * 100.0
            } else {
                0.0
            };
            (volatility, prices.len(), tick_move_pct)
        };

        if samples < MIN_SAMPLES {
            return Err(MarketDataError::Stale(format!(
                "volatility window warming up: {} of {} samples",
                samples, MIN_SAMPLES
            )));
        }

        let condition = MarketCondition {
            volatility,
            volume: quote.liquidity.unwrap_or(500.0),
            competition: Self::competition_for(self.competitor_count),
            time_of_day: Utc::now().hour(),
            // Neutral placeholder; the control loop overlays its own
            recent_performance: 0.5,
        };
        debug!(
            "📊 Market sample: volatility {:.2}%, move {:+.3}%, volume {:.0}, competition {}",
            condition.volatility,
            tick_move_pct,
            condition.volume,
            condition.competition.as_str()
        );
        Ok(condition)
    }
}
