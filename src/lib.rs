//! Dexter - multi-strategy DEX trading decision engine
//! Quotes, evaluates, risk-checks and paper-trades without touching a chain

pub mod app;
pub mod arbitrage;
pub mod config;
pub mod market;
pub mod math;
pub mod quotes;
pub mod report;
pub mod risk;
pub mod shared;
pub mod strategy;
pub mod tuner;

// Re-export main types for convenience
pub use arbitrage::ArbitrageEvaluator;
pub use config::Config;
pub use quotes::QuoteOptimizer;
pub use report::CycleReport;
pub use risk::RiskManager;
pub use strategy::StrategyScheduler;
pub use tuner::ConfigTuner;
