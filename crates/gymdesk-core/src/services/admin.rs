use serde_json::json;
use tracing::info;

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::cache::{CacheKey, TtlCache};
use crate::models::{
    Invoice, ListResponse, MembershipPlan, NewInvoice, Page, PlanInput, Reminder, ReminderBatch,
    StaffUser,
};
use crate::query::QueryClient;

use super::{read_through, LIST_CACHE_TTL, PLAN_CACHE_TTL};

/// Cache-key resources for plans and invoices.
pub const PLANS_RESOURCE: &str = "plans";
pub const INVOICES_RESOURCE: &str = "invoices";

const PLANS_PATH: &str = "/plans/";
const REMINDERS_PATH: &str = "/reminders/";
const EXPIRY_REMINDERS_PATH: &str = "/reminders/expiring/";
const INVOICES_PATH: &str = "/invoices/";
const STAFF_PATH: &str = "/staff/";

/// Membership plans, reminders, invoices and staff accounts.
#[derive(Clone)]
pub struct AdminService {
    client: ApiClient,
    queries: QueryClient,
    plan_cache: TtlCache<Vec<MembershipPlan>>,
    invoice_cache: TtlCache<Page<Invoice>>,
}

impl AdminService {
    pub fn new(client: ApiClient, queries: QueryClient) -> Self {
        Self {
            client,
            queries,
            plan_cache: TtlCache::new("plans"),
            invoice_cache: TtlCache::new("invoices"),
        }
    }

    pub async fn plans(&self) -> Result<Vec<MembershipPlan>, ApiError> {
        read_through(&self.plan_cache, PLANS_RESOURCE.to_string(), PLAN_CACHE_TTL, || async {
            let response: ListResponse<MembershipPlan> = self.client.get(PLANS_PATH).await?;
            Ok(response.into_page().items)
        })
        .await
    }

    pub async fn create_plan(&self, plan: &PlanInput) -> Result<MembershipPlan, ApiError> {
        let created = self.client.post(PLANS_PATH, plan).await?;
        self.invalidate_plans();
        Ok(created)
    }

    pub async fn update_plan(&self, id: i64, plan: &PlanInput) -> Result<MembershipPlan, ApiError> {
        let updated = self.client.put(&format!("{}{}/", PLANS_PATH, id), plan).await?;
        self.invalidate_plans();
        Ok(updated)
    }

    pub async fn delete_plan(&self, id: i64) -> Result<(), ApiError> {
        self.client.delete(&format!("{}{}/", PLANS_PATH, id)).await?;
        self.invalidate_plans();
        Ok(())
    }

    fn invalidate_plans(&self) {
        self.plan_cache.clear();
        self.queries.invalidate_prefix(PLANS_RESOURCE);
    }

    pub async fn send_reminder(&self, member: i64) -> Result<Reminder, ApiError> {
        let reminder = self.client.post(REMINDERS_PATH, &json!({ "member": member })).await?;
        info!(member_id = member, "Reminder sent");
        Ok(reminder)
    }

    /// Remind every member whose membership ends within `days`.
    pub async fn send_expiry_reminders(&self, days: u32) -> Result<ReminderBatch, ApiError> {
        let batch: ReminderBatch = self
            .client
            .post(EXPIRY_REMINDERS_PATH, &json!({ "days": days }))
            .await?;
        info!(sent = batch.sent, skipped = batch.skipped, "Expiry reminders sent");
        Ok(batch)
    }

    pub async fn invoices(&self, page: u32) -> Result<Page<Invoice>, ApiError> {
        let key: String = CacheKey::new(INVOICES_RESOURCE).page(page).into();
        read_through(&self.invoice_cache, key, LIST_CACHE_TTL, || async {
            let response: ListResponse<Invoice> = self
                .client
                .send_json(ApiRequest::get(INVOICES_PATH).query("page", page))
                .await?;
            Ok(response.into_page())
        })
        .await
    }

    pub async fn create_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, ApiError> {
        let created = self.client.post(INVOICES_PATH, invoice).await?;
        self.invoice_cache.clear();
        self.queries.invalidate_prefix(INVOICES_RESOURCE);
        Ok(created)
    }

    pub async fn staff(&self) -> Result<Vec<StaffUser>, ApiError> {
        let response: ListResponse<StaffUser> = self.client.get(STAFF_PATH).await?;
        Ok(response.into_page().items)
    }

    pub fn clear_cache(&self) {
        self.plan_cache.clear();
        self.invoice_cache.clear();
    }
}
