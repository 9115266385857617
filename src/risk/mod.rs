pub mod manager;

pub use manager::{PaperCloser, PositionCloser, RiskManager, RiskMetrics, MAX_RISK_SCORE};
