//! Installation-token cache: a keyed single-flight map, grounded on the
//! registry-of-provider-handles pattern used for token/credential caching
//! elsewhere in the corpus — one lock per installation id so concurrent
//! requesters for the *same* id coalesce onto a single outstanding refresh,
//! while requests for different ids never block each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now() + Duration::seconds(60)
    }
}

#[derive(Default)]
pub struct TokenCache {
    entries: RwLock<HashMap<i64, Arc<Mutex<Option<CachedToken>>>>>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the per-installation lock, creating it if this is the first
    /// request for this id. Holding the returned lock is what makes
    /// concurrent refreshes for the same id single-flight.
    pub async fn slot(&self, installation_id: i64) -> Arc<Mutex<Option<CachedToken>>> {
        if let Some(slot) = self.entries.read().await.get(&installation_id) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write().await;
        Arc::clone(
            entries
                .entry(installation_id)
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }
}

/// TTL applied to an installation token expiry as returned by the platform:
/// `min(expiry - 60s, 55 min)`.
#[must_use]
pub fn cache_expiry(platform_expiry: DateTime<Utc>) -> DateTime<Utc> {
    let conservative = platform_expiry - Duration::seconds(60);
    let cap = Utc::now() + Duration::minutes(55);
    conservative.min(cap)
}
