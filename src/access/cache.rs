//! Pull-based TTL cache for the allow-list.

use arc_swap::ArcSwapOption;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{AllowList, AllowListSource};
use crate::error::CanvassError;

/// Allow-list refresh interval
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Process-wide allow-list snapshot.
///
/// Readers get the current snapshot when it is younger than the TTL.
/// Otherwise the source is fetched again and the snapshot is replaced with a
/// single atomic swap; a snapshot is never mutated in place. Concurrent
/// readers of a stale snapshot share one refetch.
pub struct AllowListCache {
    source: Arc<dyn AllowListSource>,
    ttl: Duration,
    current: ArcSwapOption<AllowList>,
    refresh: Mutex<()>,
}

impl AllowListCache {
    pub fn new(source: Arc<dyn AllowListSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            current: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
        }
    }

    fn is_fresh(&self, list: &AllowList) -> bool {
        let age = Utc::now().signed_duration_since(list.fetched_at());
        match age.to_std() {
            Ok(age) => age < self.ttl,
            // fetched_at in the future (clock skew): treat as fresh
            Err(_) => true,
        }
    }

    fn fresh(&self) -> Option<Arc<AllowList>> {
        self.current
            .load_full()
            .filter(|list| self.is_fresh(list))
    }

    /// Current snapshot, refetching when stale.
    ///
    /// A failed refresh keeps serving the previous snapshot; with no previous
    /// snapshot the failure is reported as an upstream outage.
    pub async fn snapshot(&self) -> Result<Arc<AllowList>, CanvassError> {
        if let Some(list) = self.fresh() {
            return Ok(list);
        }

        let _refresh = self.refresh.lock().await;

        // Another reader may have refreshed while we waited
        let cached = self.current.load_full();
        if let Some(ref list) = cached {
            if self.is_fresh(list) {
                return Ok(Arc::clone(list));
            }
        }

        match self.source.fetch().await {
            Ok(list) => {
                let list = Arc::new(list);
                self.current.store(Some(Arc::clone(&list)));
                info!("Allow-list refreshed ({} identifiers)", list.len());
                Ok(list)
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!("Allow-list refresh failed, serving stale snapshot: {:#}", e);
                    Ok(stale)
                }
                None => {
                    warn!("Allow-list fetch failed: {:#}", e);
                    Err(CanvassError::upstream("allow-list", &e))
                }
            },
        }
    }
}
