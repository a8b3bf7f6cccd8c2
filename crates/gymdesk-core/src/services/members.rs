use std::sync::Arc;

use tracing::info;

use crate::api::{ApiClient, ApiError, ApiRequest};
use crate::cache::{CacheKey, TtlCache};
use crate::models::{ListResponse, Member, MemberFilters, MemberStats, MemberUpdate, NewMember, Page};
use crate::query::QueryClient;
use crate::utils::debounce::Debouncer;

use super::{read_through, LIST_CACHE_TTL, STATS_CACHE_TTL};

/// Cache-key resource for member lists.
pub const MEMBERS_RESOURCE: &str = "members";

const MEMBERS_PATH: &str = "/members/";
const SEARCH_PATH: &str = "/members/search/";
const STATS_PATH: &str = "/members/stats/";

#[derive(Clone)]
pub struct MemberService {
    client: ApiClient,
    queries: QueryClient,
    list_cache: TtlCache<Page<Member>>,
    stats_cache: TtlCache<MemberStats>,
}

impl MemberService {
    pub fn new(client: ApiClient, queries: QueryClient) -> Self {
        Self {
            client,
            queries,
            list_cache: TtlCache::new("members"),
            stats_cache: TtlCache::new("member-stats"),
        }
    }

    pub fn list_key(page: u32, filters: &MemberFilters) -> String {
        CacheKey::new(MEMBERS_RESOURCE)
            .page(page)
            .filter("status", filters.status.as_ref().map(|s| s.as_param()))
            .filter("type", filters.membership_type.as_ref().map(|t| t.as_param()))
            .filter("search", filters.search.as_deref())
            .into()
    }

    pub async fn list(&self, page: u32, filters: &MemberFilters) -> Result<Page<Member>, ApiError> {
        let request = ApiRequest::get(MEMBERS_PATH)
            .query("page", page)
            .query_opt("status", filters.status.map(|s| s.as_param()))
            .query_opt("membership_type", filters.membership_type.map(|t| t.as_param()))
            .query_opt("search", filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()));

        read_through(&self.list_cache, Self::list_key(page, filters), LIST_CACHE_TTL, || async {
            let response: ListResponse<Member> = self.client.send_json(request).await?;
            Ok(response.into_page())
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Member, ApiError> {
        self.client.get(&format!("{}{}/", MEMBERS_PATH, id)).await
    }

    /// Autocomplete lookup by name or phone number. Uncached.
    pub async fn search(&self, query: &str) -> Result<Vec<Member>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let response: ListResponse<Member> = self
            .client
            .send_json(ApiRequest::get(SEARCH_PATH).query("q", query))
            .await?;
        Ok(response.into_page().items)
    }

    /// Search-as-you-type. Feed every edit of the query to the returned
    /// debouncer; only the last query of a burst is sent, and `on_results`
    /// receives it with its matches.
    pub fn autocomplete<F>(&self, on_results: F) -> Debouncer<String>
    where
        F: Fn(String, Result<Vec<Member>, ApiError>) + Send + Sync + 'static,
    {
        let service = self.clone();
        let on_results = Arc::new(on_results);
        Debouncer::new(move |query: String| {
            let service = service.clone();
            let on_results = Arc::clone(&on_results);
            async move {
                let result = service.search(&query).await;
                on_results(query, result);
            }
        })
    }

    pub async fn create(&self, member: &NewMember) -> Result<Member, ApiError> {
        let created: Member = self.client.post(MEMBERS_PATH, member).await?;
        self.invalidate_lists();
        info!(member_id = created.id, "Member registered");
        Ok(created)
    }

    pub async fn update(&self, id: i64, update: &MemberUpdate) -> Result<Member, ApiError> {
        let updated = self.client.patch(&format!("{}{}/", MEMBERS_PATH, id), update).await?;
        self.invalidate_lists();
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client.delete(&format!("{}{}/", MEMBERS_PATH, id)).await?;
        self.invalidate_lists();
        info!(member_id = id, "Member deleted");
        Ok(())
    }

    /// Roster changed: drop cached lists here and in queries keyed `members`.
    fn invalidate_lists(&self) {
        self.list_cache.clear();
        self.queries.invalidate_prefix(MEMBERS_RESOURCE);
    }

    pub async fn stats(&self) -> Result<MemberStats, ApiError> {
        read_through(&self.stats_cache, "member-stats".to_string(), STATS_CACHE_TTL, || {
            self.client.get(STATS_PATH)
        })
        .await
    }

    pub fn list_cache(&self) -> &TtlCache<Page<Member>> {
        &self.list_cache
    }

    pub fn stats_cache(&self) -> &TtlCache<MemberStats> {
        &self.stats_cache
    }

    pub fn clear_cache(&self) {
        self.list_cache.clear();
        self.stats_cache.clear();
    }
}
