use serde::{Deserialize, Serialize};

use super::MembershipType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipPlan {
    pub id: i64,
    pub name: String,
    pub plan_type: MembershipType,
    pub duration_days: u32,
    #[serde(with = "super::money")]
    pub price: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanInput {
    pub name: String,
    pub plan_type: MembershipType,
    pub duration_days: u32,
    #[serde(with = "super::money")]
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
