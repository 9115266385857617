//! Quote acquisition: provider boundary, TTL cache, fee-tier optimization

pub mod cache;
pub mod optimizer;
pub mod provider;

pub use cache::QuoteCache;
pub use optimizer::{QuoteOptimizer, TierProbe, FEE_TIERS};
pub use provider::{HttpQuoteClient, QuoteProvider};
