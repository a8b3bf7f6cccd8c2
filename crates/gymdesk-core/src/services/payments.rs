use tracing::info;

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::cache::{CacheKey, TtlCache};
use crate::models::{
    ListResponse, MobileMoneyRequest, NewCashPayment, Page, Payment, PaymentFilters, PaymentStats,
};
use crate::query::QueryClient;

use super::{read_through, LIST_CACHE_TTL, STATS_CACHE_TTL};

/// Cache-key resource for payment lists.
pub const PAYMENTS_RESOURCE: &str = "payments";

const PAYMENTS_PATH: &str = "/payments/";
const MOBILE_MONEY_PATH: &str = "/payments/mobile-money/";
const STATS_PATH: &str = "/payments/stats/";

#[derive(Clone)]
pub struct PaymentService {
    client: ApiClient,
    queries: QueryClient,
    list_cache: TtlCache<Page<Payment>>,
    stats_cache: TtlCache<PaymentStats>,
}

impl PaymentService {
    pub fn new(client: ApiClient, queries: QueryClient) -> Self {
        Self {
            client,
            queries,
            list_cache: TtlCache::new("payments"),
            stats_cache: TtlCache::new("payment-stats"),
        }
    }

    pub fn list_key(page: u32, filters: &PaymentFilters) -> String {
        let member = filters.member.map(|id| id.to_string());
        CacheKey::new(PAYMENTS_RESOURCE)
            .page(page)
            .filter("method", filters.method.as_ref().map(|m| m.as_param()))
            .filter("status", filters.status.as_ref().map(|s| s.as_param()))
            .filter("member", member.as_deref())
            .into()
    }

    pub async fn list(&self, page: u32, filters: &PaymentFilters) -> Result<Page<Payment>, ApiError> {
        let request = ApiRequest::get(PAYMENTS_PATH)
            .query("page", page)
            .query_opt("payment_method", filters.method.map(|m| m.as_param()))
            .query_opt("status", filters.status.map(|s| s.as_param()))
            .query_opt("member", filters.member);

        read_through(&self.list_cache, Self::list_key(page, filters), LIST_CACHE_TTL, || async {
            let response: ListResponse<Payment> = self.client.send_json(request).await?;
            Ok(response.into_page())
        })
        .await
    }

    pub async fn record_cash(&self, payment: &NewCashPayment) -> Result<Payment, ApiError> {
        let recorded: Payment = self.client.post(PAYMENTS_PATH, payment).await?;
        self.invalidate_lists();
        info!(payment_id = recorded.id, member_id = recorded.member, "Cash payment recorded");
        Ok(recorded)
    }

    /// Push a payment prompt to the member's phone. The returned payment
    /// stays pending until the gateway confirms it; poll [`Self::payment_status`].
    pub async fn initiate_mobile_money(&self, request: &MobileMoneyRequest) -> Result<Payment, ApiError> {
        let pending: Payment = self.client.post(MOBILE_MONEY_PATH, request).await?;
        self.invalidate_lists();
        info!(payment_id = pending.id, "Mobile money payment initiated");
        Ok(pending)
    }

    pub async fn payment_status(&self, id: i64) -> Result<Payment, ApiError> {
        let payment: Payment = self.client.get(&format!("{}{}/status/", PAYMENTS_PATH, id)).await?;
        if payment.status.is_final() {
            self.invalidate_lists();
        }
        Ok(payment)
    }

    fn invalidate_lists(&self) {
        self.list_cache.clear();
        self.queries.invalidate_prefix(PAYMENTS_RESOURCE);
    }

    pub async fn stats(&self) -> Result<PaymentStats, ApiError> {
        read_through(&self.stats_cache, "payment-stats".to_string(), STATS_CACHE_TTL, || {
            self.client.get(STATS_PATH)
        })
        .await
    }

    pub fn clear_cache(&self) {
        self.list_cache.clear();
        self.stats_cache.clear();
    }
}
