pub mod evaluator;

pub use evaluator::{
    ArbitrageEvaluator, ArbitragePath, CrossPoolSpread, PathCandidate, RoundTripOutcome,
    MIN_PROFIT_BPS,
};
