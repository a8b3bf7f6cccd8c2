//! In-process stub of the gym backend for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use gymdesk_core::api::{ApiClient, ClientOptions};
use gymdesk_core::auth::{Session, SessionData};

pub const PASSWORD: &str = "front-desk";

#[derive(Default)]
pub struct Backend {
    valid_token: Mutex<String>,
    issued: AtomicU32,
    pub login_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub member_calls: AtomicU32,
    pub stats_calls: AtomicU32,
    pub check_in_calls: AtomicU32,
    /// `q` of every member search, in arrival order.
    pub search_queries: Mutex<Vec<String>>,
    /// Refresh endpoint answers 401.
    pub reject_refresh: AtomicBool,
    /// Refresh endpoint never answers in time.
    pub stall_refresh: AtomicBool,
    /// Every authenticated endpoint answers 401, even with a fresh token.
    pub reject_all: AtomicBool,
}

impl Backend {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    /// Make the backend forget the current access token, as if it expired.
    pub fn expire_access(&self) {
        *self.valid_token.lock().unwrap() = "expired".to_string();
    }

    fn issue(&self) -> String {
        let token = format!("access-{}", self.issued.fetch_add(1, Ordering::SeqCst) + 1);
        *self.valid_token.lock().unwrap() = token.clone();
        token
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        if self.reject_all.load(Ordering::SeqCst) {
            return false;
        }
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

pub struct Stub {
    pub backend: Arc<Backend>,
    pub base_url: String,
}

impl Stub {
    pub async fn start() -> Self {
        let backend = Arc::new(Backend::default());
        let base_url = serve(router(Arc::clone(&backend))).await;
        Self { backend, base_url }
    }

    pub fn options(&self) -> ClientOptions {
        ClientOptions::new(self.base_url.clone()).no_proxy()
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(self.options()).unwrap()
    }

    /// Client holding a token pair the backend currently accepts.
    pub fn signed_in_client(&self) -> ApiClient {
        let access = self.backend.issue();
        let mut session = Session::in_memory();
        session.update(SessionData::new("desk", access, Some("refresh-1".to_string()), None));
        ApiClient::with_session(self.options(), session).unwrap()
    }
}

pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api", addr)
}

fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/api/auth/login/", post(login))
        .route("/api/auth/token/refresh/", post(refresh))
        .route("/api/members/", get(list_members).post(create_member))
        .route("/api/members/stats/", get(member_stats))
        .route("/api/members/search/", get(search_members))
        .route("/api/attendance/check-in/", post(check_in))
        .with_state(backend)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Given token not valid for any token type"})),
    )
        .into_response()
}

pub fn member_json(id: i64, first_name: &str) -> Value {
    json!({
        "id": id,
        "first_name": first_name,
        "last_name": "Otieno",
        "phone_number": "0712345678",
        "membership_type": "indoor",
        "status": "active",
        "expiry_date": "2026-12-31",
        "is_checked_in": false
    })
}

async fn login(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.login_calls.fetch_add(1, Ordering::SeqCst);
    if body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }
    let access = backend.issue();
    Json(json!({
        "access": access,
        "refresh": "refresh-1",
        "user": {"id": 1, "username": body["username"], "first_name": "Amina", "is_staff": true}
    }))
    .into_response()
}

async fn refresh(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(30)).await;
    if backend.stall_refresh.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    if backend.reject_refresh.load(Ordering::SeqCst) || body["refresh"] != "refresh-1" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired"})),
        )
            .into_response();
    }
    Json(json!({"access": backend.issue()})).into_response()
}

async fn list_members(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.member_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
    Json(json!({
        "count": 2,
        "next": null,
        "previous": null,
        "results": [member_json(1, "Wanjiru"), member_json(2, "Baraka")]
    }))
    .into_response()
}

async fn create_member(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let first_name = body["first_name"].as_str().unwrap_or_default();
    if first_name.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"first_name": ["This field may not be blank."]})),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(member_json(3, first_name))).into_response()
}

async fn search_members(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    let q = params.get("q").cloned().unwrap_or_default();
    backend.search_queries.lock().unwrap().push(q.clone());
    let matches: Vec<Value> = [member_json(1, "Wanjiru"), member_json(2, "Baraka")]
        .into_iter()
        .filter(|m| {
            m["first_name"]
                .as_str()
                .is_some_and(|name| name.to_lowercase().starts_with(&q.to_lowercase()))
        })
        .collect();
    Json(Value::Array(matches)).into_response()
}

async fn member_stats(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.stats_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"total_members": 2, "active_members": 2, "expiring_soon": 1})).into_response()
}

async fn check_in(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.check_in_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    if body["member"] == 99 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Membership expired on 2026-09-30"})),
        )
            .into_response();
    }
    Json(json!({
        "id": 10,
        "member": body["member"],
        "check_in_time": "2026-10-17T06:30:00Z",
        "check_out_time": null
    }))
    .into_response()
}
