//! TTL cache for price quotes

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::shared::types::Quote;

#[derive(Debug, Clone)]
struct CachedQuote {
    quote: Quote,
    cached_at: DateTime<Utc>,
}

/// Quote cache keyed by (token_in, token_out, amount_in). Expired entries are
/// purged opportunistically on writes, not by a background sweep. Concurrent
/// fetches for the same key are not de-duplicated; the later insert wins.
pub struct QuoteCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedQuote>>,
}

impl QuoteCache {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl: Duration::milliseconds(ttl_ms as i64),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached quote if it is still inside its TTL window.
    /// Stale entries are left in place for the next write to purge.
    pub async fn get(&self, key: &str) -> Option<Quote> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if Utc::now().signed_duration_since(entry.cached_at) < self.ttl {
            Some(entry.quote.clone())
        } else {
            None
        }
    }

    pub async fn insert(&self, key: String, quote: Quote) {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        entries.retain(|_, entry| now.signed_duration_since(entry.cached_at) < self.ttl);
        entries.insert(
            key,
            CachedQuote {
                quote,
                cached_at: now,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
