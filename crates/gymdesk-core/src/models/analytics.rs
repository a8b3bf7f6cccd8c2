use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_members: u64,
    pub active_members: u64,
    #[serde(default)]
    pub checked_in_now: u64,
    #[serde(default)]
    pub visits_today: u64,
    #[serde(with = "super::money", default)]
    pub revenue_today: f64,
    #[serde(with = "super::money", default)]
    pub revenue_this_month: f64,
    #[serde(default)]
    pub expiring_this_week: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenuePeriod {
    Daily,
    Weekly,
    Monthly,
}

impl RevenuePeriod {
    pub fn as_param(&self) -> &'static str {
        match self {
            RevenuePeriod::Daily => "daily",
            RevenuePeriod::Weekly => "weekly",
            RevenuePeriod::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for RevenuePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(RevenuePeriod::Daily),
            "weekly" | "week" => Ok(RevenuePeriod::Weekly),
            "monthly" | "month" => Ok(RevenuePeriod::Monthly),
            other => Err(format!("unknown period: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub period_start: NaiveDate,
    #[serde(with = "super::money")]
    pub total: f64,
    #[serde(with = "super::money", default)]
    pub cash: f64,
    #[serde(with = "super::money", default)]
    pub mobile_money: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendancePoint {
    pub date: NaiveDate,
    pub visits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse() {
        assert_eq!("Month".parse::<RevenuePeriod>(), Ok(RevenuePeriod::Monthly));
        assert!("yearly".parse::<RevenuePeriod>().is_err());
    }

    #[test]
    fn test_dashboard_defaults() {
        let stats: DashboardStats =
            serde_json::from_str(r#"{"total_members": 120, "active_members": 98, "revenue_today": "4500"}"#).unwrap();
        assert_eq!(stats.revenue_today, 4500.0);
        assert_eq!(stats.revenue_this_month, 0.0);
    }
}
