//! Fee-tier optimization and quote batching

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::math;
use crate::quotes::cache::QuoteCache;
use crate::quotes::provider::QuoteProvider;
use crate::shared::errors::QuoteError;
use crate::shared::types::{OptimizedQuote, Quote, QuoteRequest};

/// Fee buckets probed during optimization
pub const FEE_TIERS: [u32; 3] = [500, 3_000, 10_000];

/// Bounded history of chosen tiers per pair
const TIER_HISTORY_CAP: usize = 20;

/// Outcome of probing a single fee tier
#[derive(Debug)]
pub struct TierProbe {
    pub fee_tier: u32,
    pub outcome: Result<Quote, QuoteError>,
}

/// Per-pair record of past tier selections and the last full probe time
#[derive(Debug, Default)]
struct FeeTierHistory {
    selections: VecDeque<u32>,
    last_probe: Option<DateTime<Utc>>,
}

impl FeeTierHistory {
    fn record(&mut self, fee_tier: u32, probed_at: DateTime<Utc>) {
        self.selections.push_back(fee_tier);
        while self.selections.len() > TIER_HISTORY_CAP {
            self.selections.pop_front();
        }
        self.last_probe = Some(probed_at);
    }

    /// Most frequently selected tier; ties go to the most recently used one
    fn most_frequent(&self) -> Option<u32> {
        let mut counts: HashMap<u32, (usize, usize)> = HashMap::new();
        for (idx, &tier) in self.selections.iter().enumerate() {
            let entry = counts.entry(tier).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = idx;
        }
        counts
            .into_iter()
            .max_by_key(|&(_, (count, last_idx))| (count, last_idx))
            .map(|(tier, _)| tier)
    }
}

/// Quote acquisition front end: serves cached quotes, resolves fee tiers,
/// and fans out batch requests.
pub struct QuoteOptimizer {
    provider: Arc<dyn QuoteProvider>,
    cache: QuoteCache,
    tier_history: RwLock<HashMap<String, FeeTierHistory>>,
    optimization_interval: Duration,
}

impl QuoteOptimizer {
    pub fn new(provider: Arc<dyn QuoteProvider>, cache_ttl_ms: u64, optimization_interval_ms: u64) -> Self {
        Self {
            provider,
            cache: QuoteCache::new(cache_ttl_ms),
            tier_history: RwLock::new(HashMap::new()),
            optimization_interval: Duration::milliseconds(optimization_interval_ms as i64),
        }
    }

    /// Returns a fresh-enough cached quote, or fetches one after resolving
    /// the fee tier (explicit, recently optimized, or a full probe).
    pub async fn get_optimized_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
        fee_tier: Option<u32>,
    ) -> Result<OptimizedQuote, QuoteError> {
        let request = QuoteRequest {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            fee_tier,
        };
        let key = request.cache_key();

        if let Some(quote) = self.cache.get(&key).await {
            return Ok(OptimizedQuote {
                quote,
                from_cache: true,
            });
        }

        let quote = match fee_tier {
            Some(tier) => {
                if !FEE_TIERS.contains(&tier) {
                    return Err(QuoteError::UnsupportedFeeTier(tier));
                }
                self.provider.quote(token_in, token_out, amount_in, tier).await?
            }
            None => self.fetch_with_optimized_tier(token_in, token_out, amount_in).await?,
        };

        self.cache.insert(key, quote.clone()).await;
        Ok(OptimizedQuote {
            quote,
            from_cache: false,
        })
    }

    /// Resolves all requests concurrently. Results come back aligned to the
    /// input order and each request fails independently.
    pub async fn get_batch_quotes(
        &self,
        requests: &[QuoteRequest],
    ) -> Vec<Result<OptimizedQuote, QuoteError>> {
        let futures = requests.iter().map(|request| {
            self.get_optimized_quote(
                &request.token_in,
                &request.token_out,
                request.amount_in,
                request.fee_tier,
            )
        });
        join_all(futures).await
    }

    /// Probes every known fee tier concurrently, keeping per-tier outcomes
    /// instead of collapsing failures.
    pub async fn probe_fee_tiers(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
    ) -> Vec<TierProbe> {
        let futures = FEE_TIERS.iter().map(|&tier| {
            let provider = Arc::clone(&self.provider);
            async move {
                TierProbe {
                    fee_tier: tier,
                    outcome: provider.quote(token_in, token_out, amount_in, tier).await,
                }
            }
        });
        join_all(futures).await
    }

    /// Slippage tolerance for current conditions, in whole bps
    pub fn calculate_optimal_slippage(
        &self,
        base_bps: f64,
        volatility: f64,
        liquidity: f64,
        urgency: f64,
    ) -> u32 {
        math::optimal_slippage_bps(base_bps, volatility, liquidity, urgency).round() as u32
    }

    async fn fetch_with_optimized_tier(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: f64,
    ) -> Result<Quote, QuoteError> {
        let pair = format!("{}/{}", token_in, token_out);

        if let Some(tier) = self.recent_fallback_tier(&pair).await {
            debug!("♻️ Reusing most frequent tier {} for {}", tier, pair);
            return self.provider.quote(token_in, token_out, amount_in, tier).await;
        }

        let probes = self.probe_fee_tiers(token_in, token_out, amount_in).await;

        let mut failures = Vec::new();
        let mut best: Option<&Quote> = None;
        for probe in &probes {
            match &probe.outcome {
                Ok(quote) => {
                    let efficiency = math::tier_efficiency(quote.output_amount, quote.fee_tier);
                    let current_best = best
                        .map(|b| math::tier_efficiency(b.output_amount, b.fee_tier))
                        .unwrap_or(f64::MIN);
                    if efficiency > current_best {
                        best = Some(quote);
                    }
                }
                Err(e) => {
                    debug!("tier {} probe failed for {}: {}", probe.fee_tier, pair, e);
                    failures.push(format!("tier {}: {}", probe.fee_tier, e));
                }
            }
        }

        match best {
            Some(quote) => {
                let quote = quote.clone();
                let mut history = self.tier_history.write().await;
                history
                    .entry(pair.clone())
                    .or_default()
                    .record(quote.fee_tier, Utc::now());
                debug!(
                    "🎯 Optimized fee tier for {}: {} (output {:.6})",
                    pair, quote.fee_tier, quote.output_amount
                );
                Ok(quote)
            }
            None => {
                warn!("no usable fee tier for {}", pair);
                Err(QuoteError::Unavailable {
                    pair,
                    details: failures.join("; "),
                })
            }
        }
    }

    async fn recent_fallback_tier(&self, pair: &str) -> Option<u32> {
        let history = self.tier_history.read().await;
        let entry = history.get(pair)?;
        let last_probe = entry.last_probe?;
        if Utc::now().signed_duration_since(last_probe) < self.optimization_interval {
            entry.most_frequent()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted provider: maps (pair, tier) to an output amount or an error
    #[derive(Default)]
    struct MockProvider {
        responses: Mutex<HashMap<(String, u32), Result<f64, String>>>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn set(&self, pair: &str, tier: u32, response: Result<f64, &str>) {
            self.responses.lock().unwrap().insert(
                (pair.to_string(), tier),
                response.map_err(|e| e.to_string()),
            );
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteProvider for MockProvider {
        async fn quote(
            &self,
            token_in: &str,
            token_out: &str,
            amount_in: f64,
            fee_tier: u32,
        ) -> Result<Quote, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = (format!("{}/{}", token_in, token_out), fee_tier);
            match self.responses.lock().unwrap().get(&key) {
                Some(Ok(output)) => Ok(Quote {
                    token_in: token_in.to_string(),
                    token_out: token_out.to_string(),
                    amount_in,
                    fee_tier,
                    output_amount: *output,
                    liquidity: Some(1_000.0),
                    tick: None,
                    fetched_at: Utc::now(),
                }),
                Some(Err(reason)) => Err(QuoteError::Provider(reason.clone())),
                None => Err(QuoteError::Provider("no pool at this tier".to_string())),
            }
        }
    }

    fn optimizer_with(provider: Arc<MockProvider>, ttl_ms: u64) -> QuoteOptimizer {
        QuoteOptimizer::new(provider, ttl_ms, 300_000)
    }

    #[tokio::test]
    async fn test_optimizer_selects_most_efficient_tier() {
        let provider = Arc::new(MockProvider::default());
        provider.set("WETH/USDC", 500, Ok(10.05));
        provider.set("WETH/USDC", 3_000, Ok(10.02));
        let optimizer = optimizer_with(Arc::clone(&provider), 30_000);

        let result = optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, None)
            .await
            .unwrap();

        assert_eq!(result.quote.fee_tier, 500);
        assert_eq!(result.quote.output_amount, 10.05);
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let provider = Arc::new(MockProvider::default());
        provider.set("WETH/USDC", 500, Ok(10.05));
        let optimizer = optimizer_with(Arc::clone(&provider), 30_000);

        let first = optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, None)
            .await
            .unwrap();
        let probe_calls = provider.call_count();

        let second = optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, None)
            .await
            .unwrap();

        assert!(second.from_cache);
        assert_eq!(second.quote, first.quote);
        assert_eq!(provider.call_count(), probe_calls);
    }

    #[tokio::test]
    async fn test_expired_cache_triggers_fresh_fetch() {
        let provider = Arc::new(MockProvider::default());
        provider.set("WETH/USDC", 500, Ok(10.05));
        let optimizer = optimizer_with(Arc::clone(&provider), 10);

        optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, None)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let refetched = optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, None)
            .await
            .unwrap();
        assert!(!refetched.from_cache);
    }

    #[tokio::test]
    async fn test_explicit_tier_skips_probing() {
        let provider = Arc::new(MockProvider::default());
        provider.set("WETH/USDC", 3_000, Ok(10.02));
        let optimizer = optimizer_with(Arc::clone(&provider), 30_000);

        let result = optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, Some(3_000))
            .await
            .unwrap();

        assert_eq!(result.quote.fee_tier, 3_000);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tier_is_rejected() {
        let provider = Arc::new(MockProvider::default());
        let optimizer = optimizer_with(provider, 30_000);

        let err = optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, Some(777))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::UnsupportedFeeTier(777)));
    }

    #[tokio::test]
    async fn test_unavailable_when_every_tier_fails() {
        let provider = Arc::new(MockProvider::default());
        let optimizer = optimizer_with(provider, 30_000);

        let err = optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, None)
            .await
            .unwrap_err();
        match err {
            QuoteError::Unavailable { pair, details } => {
                assert_eq!(pair, "WETH/USDC");
                assert!(details.contains("tier 500"));
                assert!(details.contains("tier 10000"));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recent_optimization_skips_probe() {
        let provider = Arc::new(MockProvider::default());
        provider.set("WETH/USDC", 500, Ok(10.05));
        provider.set("WETH/USDC", 3_000, Ok(10.02));
        let optimizer = optimizer_with(Arc::clone(&provider), 30_000);

        // Full probe selects tier 500 and stamps the pair history
        optimizer
            .get_optimized_quote("WETH", "USDC", 10.0, None)
            .await
            .unwrap();
        let calls_after_probe = provider.call_count();

        // Tier 3000 now quotes better, but the optimization interval has not
        // elapsed: the historical favourite is reused without probing
        provider.set("WETH/USDC", 3_000, Ok(25.0));
        let result = optimizer
            .get_optimized_quote("WETH", "USDC", 20.0, None)
            .await
            .unwrap();

        assert_eq!(result.quote.fee_tier, 500);
        assert_eq!(provider.call_count(), calls_after_probe + 1);
    }

    #[tokio::test]
    async fn test_batch_results_are_index_aligned() {
        let provider = Arc::new(MockProvider::default());
        provider.set("WETH/USDC", 500, Ok(10.05));
        provider.set("WBTC/USDC", 3_000, Ok(64_000.0));
        let optimizer = optimizer_with(provider, 30_000);

        let requests = vec![
            QuoteRequest::new("WETH", "USDC", 10.0),
            QuoteRequest::new("GHOST", "USDC", 5.0),
            QuoteRequest::new("WBTC", "USDC", 1.0),
        ];
        let results = optimizer.get_batch_quotes(&requests).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().quote.token_in, "WETH");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().quote.token_in, "WBTC");
    }

    #[test]
    fn test_tier_history_is_bounded() {
        let mut history = FeeTierHistory::default();
        for i in 0..25 {
            let tier = if i < 5 { 10_000 } else { 500 };
            history.record(tier, Utc::now());
        }
        assert_eq!(history.selections.len(), TIER_HISTORY_CAP);
        // The five oldest selections (tier 10000) were evicted
        assert!(history.selections.iter().all(|&t| t == 500));
    }

    #[test]
    fn test_most_frequent_tier() {
        let mut history = FeeTierHistory::default();
        history.record(500, Utc::now());
        history.record(3_000, Utc::now());
        history.record(3_000, Utc::now());
        assert_eq!(history.most_frequent(), Some(3_000));
    }

    #[test]
    fn test_slippage_passthrough_rounds() {
        let provider = Arc::new(MockProvider::default());
        let optimizer = optimizer_with(provider, 30_000);
        assert_eq!(optimizer.calculate_optimal_slippage(50.0, 0.0, 1.0, 1.0), 50);
        assert_eq!(optimizer.calculate_optimal_slippage(1.0, 0.0, 1.0, 1.0), 10);
    }
}
