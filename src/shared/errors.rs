//! Error handling for the engine

use thiserror::Error;

/// Quote acquisition errors
#[derive(Error, Debug, Clone)]
pub enum QuoteError {
    #[error("no liquidity for {pair} at any probed fee tier ({details})")]
    Unavailable { pair: String, details: String },

    #[error("provider request failed: {0}")]
    Provider(String),

    #[error("malformed provider response: missing or invalid field `{0}`")]
    MalformedResponse(String),

    #[error("unsupported fee tier: {0}")]
    UnsupportedFeeTier(u32),
}

/// Market-condition feed errors
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    #[error("market condition feed unavailable: {0}")]
    Stale(String),
}

/// Risk-manager failures
#[derive(Error, Debug, Clone)]
pub enum RiskError {
    #[error("trade rejected by {rule}: {reason}")]
    Rejected { rule: &'static str, reason: String },

    #[error("stop-loss liquidation failed for {token}: {reason}")]
    LiquidationFailed { token: String, reason: String },
}

/// Strategy execution errors
#[derive(Error, Debug, Clone)]
pub enum StrategyError {
    #[error("strategy '{strategy}' execution failed: {reason}")]
    Execution { strategy: String, reason: String },

    #[error("unknown strategy: {0}")]
    Unknown(String),

    #[error("no strategies registered")]
    NoneRegistered,
}

/// Fatal configuration problems, detected at startup
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("cannot load config file: {0}")]
    Unreadable(String),
}

/// Top-level engine error
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("quote error: {0}")]
    Quote(#[from] QuoteError),

    #[error("market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
