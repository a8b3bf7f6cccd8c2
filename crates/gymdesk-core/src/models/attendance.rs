use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub member: i64,
    #[serde(default)]
    pub member_name: Option<String>,
    pub check_in_time: DateTime<Utc>,
    #[serde(default)]
    pub check_out_time: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.check_out_time.is_none()
    }

    /// Time spent in the gym, up to now for open visits.
    pub fn duration(&self) -> chrono::Duration {
        self.check_out_time.unwrap_or_else(Utc::now) - self.check_in_time
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceFilters {
    pub date: Option<NaiveDate>,
    pub member: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceStats {
    pub checked_in_now: u64,
    pub visits_today: u64,
    #[serde(default)]
    pub visits_this_week: u64,
    #[serde(default)]
    pub average_duration_minutes: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Attended,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub member: i64,
    #[serde(default)]
    pub member_name: Option<String>,
    pub session_name: String,
    pub starts_at: DateTime<Utc>,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBooking {
    pub member: i64,
    pub session_name: String,
    pub starts_at: DateTime<Utc>,
}
