//! Domain services over the API client.
//!
//! Each service is a thin wrapper mapping domain operations to HTTP calls.
//! Read-heavy endpoints go through two independent [`TtlCache`] instances
//! per service (list data and aggregate stats) so invalidating one never
//! evicts the other.

mod admin;
mod analytics;
mod attendance;
mod members;
mod payments;

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::cache::TtlCache;
use crate::query::QueryClient;

pub use admin::{AdminService, INVOICES_RESOURCE, PLANS_RESOURCE};
pub use analytics::{AnalyticsService, DASHBOARD_RESOURCE, REVENUE_RESOURCE, TREND_RESOURCE};
pub use attendance::{AttendanceService, ATTENDANCE_RESOURCE, BOOKINGS_RESOURCE};
pub use members::{MemberService, MEMBERS_RESOURCE};
pub use payments::{PaymentService, PAYMENTS_RESOURCE};

// ============================================================================
// Cache lifetimes
// ============================================================================

pub const LIST_CACHE_TTL: Duration = Duration::from_secs(60);
pub const STATS_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const PLAN_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const SUMMARY_CACHE_TTL: Duration = Duration::from_secs(2 * 60);
pub const REPORT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Serve `key` from `cache`, or fetch and store it for `ttl`.
/// Failures are never cached.
pub(crate) async fn read_through<V, F, Fut>(
    cache: &TtlCache<V>,
    key: String,
    ttl: Duration,
    fetch: F,
) -> Result<V, ApiError>
where
    V: Clone + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, ApiError>>,
{
    if let Some(value) = cache.get(&key) {
        debug!(cache = cache.name(), key = %key, "Cache hit");
        return Ok(value);
    }
    debug!(cache = cache.name(), key = %key, "Cache miss");
    let value = fetch().await?;
    cache.set(key, value.clone(), ttl);
    Ok(value)
}

/// Every domain service over one shared [`ApiClient`].
///
/// Services also share `queries`: a mutation drops the [`ApiQuery`](crate::ApiQuery)
/// responses cached under its resource name (`members`, `payments`,
/// `attendance`, `bookings`, `plans`, `invoices`), so queries over service
/// reads should use those names as their cache key.
#[derive(Clone)]
pub struct Gym {
    pub client: ApiClient,
    pub queries: QueryClient,
    pub members: MemberService,
    pub payments: PaymentService,
    pub attendance: AttendanceService,
    pub admin: AdminService,
    pub analytics: AnalyticsService,
}

impl Gym {
    pub fn new(client: ApiClient) -> Self {
        Self::with_queries(client, QueryClient::new())
    }

    pub fn with_queries(client: ApiClient, queries: QueryClient) -> Self {
        Self {
            members: MemberService::new(client.clone(), queries.clone()),
            payments: PaymentService::new(client.clone(), queries.clone()),
            attendance: AttendanceService::new(client.clone(), queries.clone()),
            admin: AdminService::new(client.clone(), queries.clone()),
            analytics: AnalyticsService::new(client.clone(), queries.clone()),
            client,
            queries,
        }
    }

    /// Drop every cached response, e.g. after switching accounts.
    pub fn clear_caches(&self) {
        self.members.clear_cache();
        self.payments.clear_cache();
        self.attendance.clear_cache();
        self.admin.clear_cache();
        self.analytics.invalidate();
        self.queries.clear();
    }

    /// Sign out and forget everything fetched under the old session.
    pub fn logout(&self) {
        self.client.logout();
        self.clear_caches();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_read_through_caches_until_ttl() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        let calls = Arc::new(AtomicU32::new(0));

        let fetch = || {
            let calls = Arc::clone(&calls);
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        };

        let first = read_through(&cache, "k".to_string(), LIST_CACHE_TTL, fetch).await.unwrap();
        let second = read_through(&cache, "k".to_string(), LIST_CACHE_TTL, fetch).await.unwrap();
        assert_eq!((first, second), (1, 1));

        tokio::time::advance(LIST_CACHE_TTL).await;
        let third = read_through(&cache, "k".to_string(), LIST_CACHE_TTL, fetch).await.unwrap();
        assert_eq!(third, 2);
    }

    #[tokio::test]
    async fn test_read_through_does_not_cache_errors() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        let result = read_through(&cache, "k".to_string(), LIST_CACHE_TTL, || async {
            Err(ApiError::NotFound("gone".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert!(!cache.has("k"));
    }
}
