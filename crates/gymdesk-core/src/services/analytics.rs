use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::cache::{CacheKey, TtlCache};
use crate::models::{AttendancePoint, DashboardStats, RevenuePeriod, RevenuePoint};
use crate::query::QueryClient;

use super::{read_through, REPORT_CACHE_TTL, SUMMARY_CACHE_TTL};

/// Cache-key resources for the summary and the two reports.
pub const DASHBOARD_RESOURCE: &str = "dashboard";
pub const REVENUE_RESOURCE: &str = "revenue";
pub const TREND_RESOURCE: &str = "attendance-trend";

const DASHBOARD_PATH: &str = "/analytics/dashboard/";
const REVENUE_PATH: &str = "/analytics/revenue/";
const ATTENDANCE_TREND_PATH: &str = "/analytics/attendance/";

/// Dashboard summary and reports. Summary and reports expire on their own
/// schedules; [`AnalyticsService::invalidate`] drops both.
#[derive(Clone)]
pub struct AnalyticsService {
    client: ApiClient,
    queries: QueryClient,
    summary_cache: TtlCache<DashboardStats>,
    revenue_cache: TtlCache<Vec<RevenuePoint>>,
    trend_cache: TtlCache<Vec<AttendancePoint>>,
}

impl AnalyticsService {
    pub fn new(client: ApiClient, queries: QueryClient) -> Self {
        Self {
            client,
            queries,
            summary_cache: TtlCache::new("dashboard"),
            revenue_cache: TtlCache::new("revenue-report"),
            trend_cache: TtlCache::new("attendance-report"),
        }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, ApiError> {
        read_through(&self.summary_cache, DASHBOARD_RESOURCE.to_string(), SUMMARY_CACHE_TTL, || {
            self.client.get(DASHBOARD_PATH)
        })
        .await
    }

    pub async fn revenue(&self, period: RevenuePeriod) -> Result<Vec<RevenuePoint>, ApiError> {
        let key: String = CacheKey::new(REVENUE_RESOURCE)
            .filter("period", Some(period.as_param()))
            .into();
        read_through(&self.revenue_cache, key, REPORT_CACHE_TTL, || {
            self.client
                .send_json(ApiRequest::get(REVENUE_PATH).query("period", period.as_param()))
        })
        .await
    }

    pub async fn attendance_trend(&self, days: u32) -> Result<Vec<AttendancePoint>, ApiError> {
        let key: String = CacheKey::new(TREND_RESOURCE).id("days", days).into();
        read_through(&self.trend_cache, key, REPORT_CACHE_TTL, || {
            self.client
                .send_json(ApiRequest::get(ATTENDANCE_TREND_PATH).query("days", days))
        })
        .await
    }

    pub fn invalidate(&self) {
        self.summary_cache.clear();
        self.revenue_cache.clear();
        self.trend_cache.clear();
        for resource in [DASHBOARD_RESOURCE, REVENUE_RESOURCE, TREND_RESOURCE] {
            self.queries.invalidate_prefix(resource);
        }
    }
}
