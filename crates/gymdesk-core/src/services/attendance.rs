use chrono::NaiveDate;
use serde_json::json;
use tracing::info;

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::cache::{CacheKey, TtlCache};
use crate::models::{AttendanceRecord, AttendanceStats, Booking, ListResponse, NewBooking, Page};
use crate::query::QueryClient;

use super::{read_through, LIST_CACHE_TTL, STATS_CACHE_TTL};

/// Cache-key resources for visit and booking lists.
pub const ATTENDANCE_RESOURCE: &str = "attendance";
pub const BOOKINGS_RESOURCE: &str = "bookings";

const ATTENDANCE_PATH: &str = "/attendance/";
const CHECK_IN_PATH: &str = "/attendance/check-in/";
const CHECK_OUT_PATH: &str = "/attendance/check-out/";
const ACTIVE_PATH: &str = "/attendance/active/";
const STATS_PATH: &str = "/attendance/stats/";
const BOOKINGS_PATH: &str = "/bookings/";

#[derive(Clone)]
pub struct AttendanceService {
    client: ApiClient,
    queries: QueryClient,
    list_cache: TtlCache<Page<AttendanceRecord>>,
    booking_cache: TtlCache<Page<Booking>>,
    stats_cache: TtlCache<AttendanceStats>,
}

impl AttendanceService {
    pub fn new(client: ApiClient, queries: QueryClient) -> Self {
        Self {
            client,
            queries,
            list_cache: TtlCache::new("attendance"),
            booking_cache: TtlCache::new("bookings"),
            stats_cache: TtlCache::new("attendance-stats"),
        }
    }

    pub async fn check_in(&self, member: i64) -> Result<AttendanceRecord, ApiError> {
        let record: AttendanceRecord = self.client.post(CHECK_IN_PATH, &json!({ "member": member })).await?;
        self.after_visit_change();
        info!(member_id = member, "Checked in");
        Ok(record)
    }

    pub async fn check_out(&self, member: i64) -> Result<AttendanceRecord, ApiError> {
        let record: AttendanceRecord = self.client.post(CHECK_OUT_PATH, &json!({ "member": member })).await?;
        self.after_visit_change();
        info!(member_id = member, "Checked out");
        Ok(record)
    }

    // Occupancy counters move with every visit, so stats go too.
    fn after_visit_change(&self) {
        self.list_cache.clear();
        self.stats_cache.clear();
        self.queries.invalidate_prefix(ATTENDANCE_RESOURCE);
    }

    pub async fn list(&self, page: u32, date: Option<NaiveDate>) -> Result<Page<AttendanceRecord>, ApiError> {
        let date = date.map(|d| d.format("%Y-%m-%d").to_string());
        let key: String = CacheKey::new(ATTENDANCE_RESOURCE)
            .page(page)
            .filter("date", date.as_deref())
            .into();
        let request = ApiRequest::get(ATTENDANCE_PATH)
            .query("page", page)
            .query_opt("date", date.as_deref());

        read_through(&self.list_cache, key, LIST_CACHE_TTL, || async {
            let response: ListResponse<AttendanceRecord> = self.client.send_json(request).await?;
            Ok(response.into_page())
        })
        .await
    }

    /// Members currently in the building. Always fetched live.
    pub async fn active(&self) -> Result<Vec<AttendanceRecord>, ApiError> {
        let response: ListResponse<AttendanceRecord> = self.client.get(ACTIVE_PATH).await?;
        Ok(response.into_page().items)
    }

    pub async fn stats(&self) -> Result<AttendanceStats, ApiError> {
        read_through(&self.stats_cache, "attendance-stats".to_string(), STATS_CACHE_TTL, || {
            self.client.get(STATS_PATH)
        })
        .await
    }

    // ===== Bookings =====

    pub async fn bookings(&self, page: u32) -> Result<Page<Booking>, ApiError> {
        let key: String = CacheKey::new(BOOKINGS_RESOURCE).page(page).into();
        read_through(&self.booking_cache, key, LIST_CACHE_TTL, || async {
            let response: ListResponse<Booking> = self
                .client
                .send_json(ApiRequest::get(BOOKINGS_PATH).query("page", page))
                .await?;
            Ok(response.into_page())
        })
        .await
    }

    pub async fn create_booking(&self, booking: &NewBooking) -> Result<Booking, ApiError> {
        let created: Booking = self.client.post(BOOKINGS_PATH, booking).await?;
        self.invalidate_bookings();
        Ok(created)
    }

    pub async fn cancel_booking(&self, id: i64) -> Result<Booking, ApiError> {
        let cancelled: Booking = self
            .client
            .post(&format!("{}{}/cancel/", BOOKINGS_PATH, id), &json!({}))
            .await?;
        self.invalidate_bookings();
        Ok(cancelled)
    }

    fn invalidate_bookings(&self) {
        self.booking_cache.clear();
        self.queries.invalidate_prefix(BOOKINGS_RESOURCE);
    }

    pub fn clear_cache(&self) {
        self.list_cache.clear();
        self.booking_cache.clear();
        self.stats_cache.clear();
    }
}
