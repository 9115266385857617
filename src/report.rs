//! Per-cycle decision reporting
//!
//! Every pass through the control loop ends in exactly one report: which
//! strategy ran, how the cycle was classified, the reason it ended the way
//! it did, and a snapshot of ledger health and per-strategy performance at
//! that moment. Reports serialize to JSON for downstream collection.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::risk::RiskMetrics;
use crate::shared::types::{CycleOutcome, PerformanceMetrics, TradeResult};
use crate::shared::utils;

/// Performance record labelled with the strategy it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct StrategyPerformance {
    pub strategy: String,
    pub metrics: PerformanceMetrics,
}

/// One control-loop cycle, fully attributed
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub id: String,
    pub cycle: u64,
    pub strategy: String,
    pub outcome: CycleOutcome,
    /// The single reason this cycle ended the way it did
    pub reason: String,
    pub profit: f64,
    pub volume: f64,
    pub pool: Option<String>,
    pub risk: RiskMetrics,
    pub performance: Vec<StrategyPerformance>,
    pub timestamp: DateTime<Utc>,
}

impl CycleReport {
    pub fn new(
        cycle: u64,
        result: &TradeResult,
        outcome: CycleOutcome,
        risk: RiskMetrics,
        performance: Vec<(&'static str, PerformanceMetrics)>,
    ) -> Self {
        let reason = match outcome {
            CycleOutcome::Executed => format!("filled {}", result.pool),
            _ => result
                .error
                .clone()
                .unwrap_or_else(|| "no reason recorded".to_string()),
        };
        let pool = if result.pool.is_empty() {
            None
        } else {
            Some(result.pool.clone())
        };

        Self {
            id: utils::report_id(),
            cycle,
            strategy: result.strategy.clone(),
            outcome,
            reason,
            profit: result.profit,
            volume: result.volume,
            pool,
            risk,
            performance: performance
                .into_iter()
                .map(|(strategy, metrics)| StrategyPerformance {
                    strategy: strategy.to_string(),
                    metrics,
                })
                .collect(),
            timestamp: Utc::now(),
        }
    }

    /// One-line rendering for the cycle log
    pub fn summary(&self) -> String {
        match self.outcome {
            CycleOutcome::Executed => format!(
                "cycle {} | {} filled {} for {:.4} profit on {:.2} volume | balance {:.2}",
                self.cycle,
                self.strategy,
                self.pool.as_deref().unwrap_or("?"),
                self.profit,
                self.volume,
                self.risk.current_balance,
            ),
            CycleOutcome::Rejected => format!(
                "cycle {} | {} passed: {}",
                self.cycle, self.strategy, self.reason
            ),
            CycleOutcome::Error => format!(
                "cycle {} | {} failed: {}",
                self.cycle, self.strategy, self.reason
            ),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
