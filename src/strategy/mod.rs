//! Trading strategies and their scheduler

pub mod scheduler;
pub mod strategies;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::shared::errors::StrategyError;
use crate::shared::types::{MarketCondition, TradeResult};

pub const ARBITRAGE: &str = "arbitrage";
pub const TRIANGULAR: &str = "triangular";
pub const FIBONACCI: &str = "fibonacci";
pub const LIQUIDITY_SPIDER: &str = "liquidity-spider";

/// Latest market snapshot, shared between the control loop and strategies
pub type SharedConditions = Arc<RwLock<MarketCondition>>;

/// A named trading strategy driven by the scheduler
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether current conditions suit this strategy
    fn should_activate(&self, condition: &MarketCondition) -> bool;

    /// Runs one trading cycle. Expected no-trade outcomes are returned as
    /// unsuccessful results; errors are reserved for genuine failures and
    /// are converted by the scheduler, never propagated out of the loop.
    async fn execute(&self) -> Result<TradeResult, StrategyError>;
}

pub use scheduler::{RotationMode, StrategyScheduler};
pub use strategies::{
    ArbitrageStrategy, FibonacciStrategy, LiquiditySpiderStrategy, TriangularStrategy,
};
