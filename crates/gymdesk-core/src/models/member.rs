use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    Indoor,
    Outdoor,
}

impl std::fmt::Display for MembershipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipType::Indoor => f.pad("Indoor"),
            MembershipType::Outdoor => f.pad("Outdoor"),
        }
    }
}

impl MembershipType {
    pub fn as_param(&self) -> &'static str {
        match self {
            MembershipType::Indoor => "indoor",
            MembershipType::Outdoor => "outdoor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Expired,
    Suspended,
    #[serde(other)]
    Unknown,
}

impl MemberStatus {
    pub fn as_param(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Expired => "expired",
            MemberStatus::Suspended => "suspended",
            MemberStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub membership_type: MembershipType,
    #[serde(default)]
    pub plan: Option<i64>,
    #[serde(default)]
    pub plan_name: Option<String>,
    pub status: MemberStatus,
    #[serde(default)]
    pub join_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_checked_in: bool,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Days until the membership expires; negative once expired.
    pub fn days_until_expiry(&self) -> Option<i64> {
        self.expiry_date
            .map(|expiry| (expiry - Utc::now().date_naive()).num_days())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMember {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub membership_type: MembershipType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<i64>,
}

/// Partial update; unset fields are left alone by the backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemberUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_type: Option<MembershipType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemberFilters {
    pub status: Option<MemberStatus>,
    pub membership_type: Option<MembershipType>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberStats {
    pub total_members: u64,
    pub active_members: u64,
    #[serde(default)]
    pub expired_members: u64,
    #[serde(default)]
    pub indoor_members: u64,
    #[serde(default)]
    pub outdoor_members: u64,
    #[serde(default)]
    pub expiring_soon: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_member() {
        let json = r#"{"id": 7, "first_name": "Wanjiru", "last_name": "Kamau", "phone_number": "0712345678",
            "membership_type": "outdoor", "plan": 2, "status": "active", "join_date": "2026-01-04",
            "expiry_date": "2026-02-04", "is_checked_in": true}"#;
        let member: Member = serde_json::from_str(json).unwrap();
        assert_eq!(member.full_name(), "Wanjiru Kamau");
        assert_eq!(member.membership_type, MembershipType::Outdoor);
        assert!(member.is_checked_in);
        assert!(member.days_until_expiry().is_some());
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let json = r#"{"id": 1, "first_name": "A", "last_name": "B", "membership_type": "indoor", "status": "frozen"}"#;
        let member: Member = serde_json::from_str(json).unwrap();
        assert_eq!(member.status, MemberStatus::Unknown);
    }

    #[test]
    fn test_update_skips_unset_fields() {
        let update = MemberUpdate {
            phone_number: Some("0700000000".to_string()),
            ..MemberUpdate::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"phone_number": "0700000000"})
        );
    }
}
