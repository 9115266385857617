//! Arbitrage path evaluation

use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

use crate::math;
use crate::quotes::optimizer::{QuoteOptimizer, TierProbe};
use crate::shared::types::Quote;

/// A path must clear this many bps of round-trip profit to be viable
pub const MIN_PROFIT_BPS: i64 = 20;

/// Cross-pool outputs must diverge by at least this share of the input
/// amount, in percent, before a spread is worth reporting
pub const MIN_DIVERGENCE_PCT: f64 = 0.1;

/// A token pair and size to evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct PathCandidate {
    pub token_a: String,
    pub token_b: String,
    pub amount_in: f64,
}

impl PathCandidate {
    pub fn new(token_a: impl Into<String>, token_b: impl Into<String>, amount_in: f64) -> Self {
        Self {
            token_a: token_a.into(),
            token_b: token_b.into(),
            amount_in,
        }
    }
}

/// An evaluated arbitrage path. A path with fewer than two liquidity sources
/// is reported as non-viable with zero profit rather than as an error.
#[derive(Debug, Clone)]
pub struct ArbitragePath {
    pub token_a: String,
    pub token_b: String,
    pub amount_in: f64,
    pub forward_quote: Option<Quote>,
    pub reverse_quote: Option<Quote>,
    pub profit_bps: i64,
    pub viable: bool,
    pub liquidity_sources: usize,
}

impl ArbitragePath {
    fn dead_end(candidate: &PathCandidate, forward: Option<Quote>, sources: usize) -> Self {
        Self {
            token_a: candidate.token_a.clone(),
            token_b: candidate.token_b.clone(),
            amount_in: candidate.amount_in,
            forward_quote: forward,
            reverse_quote: None,
            profit_bps: 0,
            viable: false,
            liquidity_sources: sources,
        }
    }

    pub fn pair_label(&self) -> String {
        format!("{}/{}", self.token_a, self.token_b)
    }
}

/// Result of quoting A -> B -> A
#[derive(Debug, Clone)]
pub struct RoundTripOutcome {
    pub initial_amount: f64,
    pub intermediate_amount: f64,
    pub final_amount: f64,
    /// Net gain as a fraction of the initial amount
    pub gain: f64,
}

/// Price divergence between the richest and poorest fee tier for one pair
#[derive(Debug, Clone)]
pub struct CrossPoolSpread {
    pub buy_tier: u32,
    pub sell_tier: u32,
    pub low_output: f64,
    pub high_output: f64,
    pub divergence_pct: f64,
    pub gross_profit_bps: f64,
}

/// Scores round-trip profit opportunities across fee tiers
pub struct ArbitrageEvaluator {
    optimizer: Arc<QuoteOptimizer>,
}

impl ArbitrageEvaluator {
    pub fn new(optimizer: Arc<QuoteOptimizer>) -> Self {
        Self { optimizer }
    }

    /// Evaluates all candidates concurrently and returns the results sorted
    /// by descending profit. Per-path failures degrade to non-viable entries
    /// instead of poisoning the batch.
    pub async fn evaluate_paths(&self, candidates: &[PathCandidate]) -> Vec<ArbitragePath> {
        let futures = candidates.iter().map(|candidate| self.evaluate_path(candidate));
        let mut paths = join_all(futures).await;
        paths.sort_by(|a, b| b.profit_bps.cmp(&a.profit_bps));
        paths
    }

    /// Forward quote and a provisional reverse quote run concurrently; the
    /// reverse is then re-fetched sized to the actual forward output, which
    /// has to wait for the forward result.
    pub async fn evaluate_path(&self, candidate: &PathCandidate) -> ArbitragePath {
        let PathCandidate {
            token_a,
            token_b,
            amount_in,
        } = candidate;

        // The provisional reverse runs at nominal size to overlap provider
        // latency and warm the reverse pair's tier history; the sized
        // refetch below supersedes it.
        let (forward_probes, _provisional) = tokio::join!(
            self.optimizer.probe_fee_tiers(token_a, token_b, *amount_in),
            self.optimizer
                .get_optimized_quote(token_b, token_a, *amount_in, None)
        );

        let sources = forward_probes
            .iter()
            .filter(|probe| probe.outcome.is_ok())
            .count();

        let forward = forward_probes
            .iter()
            .filter_map(|probe| probe.outcome.as_ref().ok())
            .max_by(|a, b| {
                math::tier_efficiency(a.output_amount, a.fee_tier)
                    .total_cmp(&math::tier_efficiency(b.output_amount, b.fee_tier))
            })
            .cloned();

        if sources < 2 {
            debug!(
                "path {}/{} has {} liquidity source(s), cannot be arbitraged",
                token_a, token_b, sources
            );
            return ArbitragePath::dead_end(candidate, forward, sources);
        }
        let forward = match forward {
            Some(quote) => quote,
            None => return ArbitragePath::dead_end(candidate, None, sources),
        };

        let reverse = match self
            .optimizer
            .get_optimized_quote(token_b, token_a, forward.output_amount, None)
            .await
        {
            Ok(optimized) => optimized.quote,
            Err(e) => {
                debug!("reverse leg failed for {}/{}: {}", token_b, token_a, e);
                return ArbitragePath::dead_end(candidate, Some(forward), sources);
            }
        };

        let profit = reverse.output_amount - amount_in;
        let profit_bps = math::profit_bps(profit, *amount_in);
        let viable = profit_bps > MIN_PROFIT_BPS && sources > 1;

        ArbitragePath {
            token_a: token_a.clone(),
            token_b: token_b.clone(),
            amount_in: *amount_in,
            forward_quote: Some(forward),
            reverse_quote: Some(reverse),
            profit_bps,
            viable,
            liquidity_sources: sources,
        }
    }

    /// Quotes A -> B, then B -> A with the first leg's output as input
    pub async fn round_trip(
        &self,
        token_a: &str,
        token_b: &str,
        amount_in: f64,
    ) -> Result<RoundTripOutcome, crate::shared::errors::QuoteError> {
        let first = self
            .optimizer
            .get_optimized_quote(token_a, token_b, amount_in, None)
            .await?;
        let second = self
            .optimizer
            .get_optimized_quote(token_b, token_a, first.quote.output_amount, None)
            .await?;

        Ok(RoundTripOutcome {
            initial_amount: amount_in,
            intermediate_amount: first.quote.output_amount,
            final_amount: second.quote.output_amount,
            gain: math::round_trip_gain(amount_in, second.quote.output_amount),
        })
    }

    /// Flags a pair whose fee tiers price the same input far enough apart.
    /// Requires at least two successful probes.
    pub fn cross_pool_spread(probes: &[TierProbe], amount_in: f64) -> Option<CrossPoolSpread> {
        let quotes: Vec<&Quote> = probes
            .iter()
            .filter_map(|probe| probe.outcome.as_ref().ok())
            .collect();
        if quotes.len() < 2 {
            return None;
        }

        let high = quotes
            .iter()
            .max_by(|a, b| a.output_amount.total_cmp(&b.output_amount))?;
        let low = quotes
            .iter()
            .min_by(|a, b| a.output_amount.total_cmp(&b.output_amount))?;

        let divergence_pct = (high.output_amount - low.output_amount) / amount_in * 100.0;
        if divergence_pct <= MIN_DIVERGENCE_PCT {
            return None;
        }

        Some(CrossPoolSpread {
            buy_tier: low.fee_tier,
            sell_tier: high.fee_tier,
            low_output: low.output_amount,
            high_output: high.output_amount,
            divergence_pct,
            gross_profit_bps: math::gross_spread_bps(high.output_amount, low.output_amount, amount_in),
        })
    }
}
