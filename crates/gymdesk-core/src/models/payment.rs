use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
}

impl PaymentMethod {
    pub fn as_param(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::MobileMoney => "mobile_money",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "Cash"),
            PaymentMethod::MobileMoney => write!(f, "Mobile money"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    pub fn as_param(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Unknown => "unknown",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub member: i64,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(with = "super::money")]
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCashPayment {
    pub member: i64,
    #[serde(with = "super::money")]
    pub amount: f64,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<i64>,
}

impl NewCashPayment {
    pub fn new(member: i64, amount: f64) -> Self {
        Self {
            member,
            amount,
            payment_method: PaymentMethod::Cash,
            plan: None,
        }
    }
}

/// Mobile-money push request; the backend prompts the phone to approve.
#[derive(Debug, Clone, Serialize)]
pub struct MobileMoneyRequest {
    pub member: i64,
    #[serde(with = "super::money")]
    pub amount: f64,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentFilters {
    pub method: Option<PaymentMethod>,
    pub status: Option<PaymentStatus>,
    pub member: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStats {
    #[serde(with = "super::money")]
    pub total_revenue: f64,
    #[serde(with = "super::money", default)]
    pub revenue_this_month: f64,
    #[serde(default)]
    pub total_payments: u64,
    #[serde(default)]
    pub pending_payments: u64,
    #[serde(with = "super::money", default)]
    pub cash_total: f64,
    #[serde(with = "super::money", default)]
    pub mobile_money_total: f64,
}
