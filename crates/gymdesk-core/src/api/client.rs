//! API client for the gym backend.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! API requests. Each request is sent with the current access token; on a
//! 401 the client refreshes the token once and re-sends the request once.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::auth::{AuthStatus, Session, SessionData};
use crate::config::{Config, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
use crate::models::UserProfile;

use super::request::Attempt;
use super::{ApiError, ApiRequest};

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/auth/login/";
const REFRESH_PATH: &str = "/auth/token/refresh/";
const PROFILE_PATH: &str = "/auth/me/";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(alias = "access_token", alias = "token")]
    access: String,
    #[serde(default, alias = "refresh_token")]
    refresh: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "access_token")]
    access: String,
    #[serde(default, alias = "refresh_token")]
    refresh: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
    /// Honour `HTTP(S)_PROXY` from the environment.
    pub system_proxy: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            system_proxy: true,
        }
    }
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect directly, ignoring any proxy configured in the environment.
    pub fn no_proxy(mut self) -> Self {
        self.system_proxy = false;
        self
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config.api_base_url()?.to_string(),
            timeout: config.request_timeout(),
            ..Self::default()
        })
    }
}

/// API client for the gym backend.
/// Clone is cheap - clones share the connection pool, session and refresh lock.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    session: Arc<RwLock<Session>>,
    /// Serializes token refreshes across concurrent requests.
    refresh_lock: Arc<Mutex<()>>,
    status: Arc<watch::Sender<AuthStatus>>,
}

impl ApiClient {
    /// Create a client with an in-memory session
    pub fn new(options: ClientOptions) -> Result<Self, ApiError> {
        Self::with_session(options, Session::in_memory())
    }

    /// Create a client around an existing (possibly persisted) session
    pub fn with_session(options: ClientOptions, session: Session) -> Result<Self, ApiError> {
        let mut builder = Client::builder().timeout(options.timeout);
        if !options.system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let initial = if session.is_authenticated() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Anonymous
        };
        let (status, _) = watch::channel(initial);

        Ok(Self {
            client,
            base_url: Arc::from(options.base_url.trim_end_matches('/')),
            session: Arc::new(RwLock::new(session)),
            refresh_lock: Arc::new(Mutex::new(())),
            status: Arc::new(status),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Subscribe to sign-in state changes.
    /// `AuthStatus::Expired` means the user has to be sent back to login.
    pub fn auth_status(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_session().is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.read_session().user().cloned()
    }

    pub fn username(&self) -> Option<String> {
        self.read_session().data.as_ref().map(|d| d.username.clone())
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn access_token(&self) -> Option<String> {
        self.read_session().access_token().map(str::to_string)
    }

    fn refresh_token(&self) -> Option<String> {
        self.read_session().refresh_token().map(str::to_string)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // ===== Session lifecycle =====

    /// Sign in and persist the new token pair and user profile
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ApiError> {
        let request = ApiRequest::post(LOGIN_PATH).json(&serde_json::json!({
            "username": username,
            "password": password,
        }))?;

        let response = self.dispatch(&request, None).await?;
        let response = Self::check_response(response).await?;
        let login: LoginResponse = Self::decode(response, LOGIN_PATH).await?;

        {
            let mut session = self.write_session();
            session.update(SessionData::new(
                username,
                login.access,
                login.refresh,
                login.user.clone(),
            ));
            if let Err(e) = session.save() {
                warn!(error = %e, "Failed to persist session");
            }
        }
        self.status.send_replace(AuthStatus::Authenticated);
        info!(username = username, "Signed in");

        match login.user {
            Some(user) => Ok(user),
            None => {
                let user: UserProfile = self.get(PROFILE_PATH).await?;
                let mut session = self.write_session();
                if let Some(data) = session.data.as_mut() {
                    data.user = Some(user.clone());
                }
                if let Err(e) = session.save() {
                    warn!(error = %e, "Failed to persist session");
                }
                Ok(user)
            }
        }
    }

    /// Destroy the token pair and cached profile
    pub fn logout(&self) {
        if let Err(e) = self.write_session().clear() {
            warn!(error = %e, "Failed to remove session file");
        }
        self.status.send_replace(AuthStatus::Anonymous);
        info!("Signed out");
    }

    /// Terminal transition: credentials are gone and the user must sign in again.
    fn expire_session(&self) {
        if let Err(e) = self.write_session().clear() {
            warn!(error = %e, "Failed to remove session file");
        }
        self.status.send_replace(AuthStatus::Expired);
    }

    // ===== Request pipeline =====

    /// Send one HTTP request with the given bearer token, no retry logic.
    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        builder.send().await.map_err(|e| {
            let err = ApiError::from_transport(e);
            if let ApiError::Unreachable { cause } = &err {
                warn!(method = %request.method, path = %request.path, cause = %cause, "Server unreachable");
            }
            err
        })
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let bytes = response.bytes().await.map_err(ApiError::from_transport)?;
        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    /// Send a request with the current access token.
    ///
    /// A 401 is answered with one token refresh and one retry. A second 401,
    /// or a rejected refresh, ends the session with `ApiError::SessionExpired`.
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let mut attempt = Attempt::Initial;

        loop {
            let token = self.access_token();
            let response = self.dispatch(request, token.as_deref()).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Self::check_response(response).await;
            }

            match attempt {
                Attempt::Initial if self.refresh_token().is_some() => {
                    debug!(path = %request.path, "Access token rejected, refreshing");
                    self.refresh_after(token.as_deref()).await?;
                    attempt = Attempt::Retried;
                }
                Attempt::Initial => {
                    let expired = *self.status.borrow() == AuthStatus::Expired;
                    if expired {
                        return Err(ApiError::SessionExpired);
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::from_status(StatusCode::UNAUTHORIZED, &body));
                }
                Attempt::Retried => {
                    warn!(path = %request.path, "Retried request rejected again, ending session");
                    self.expire_session();
                    return Err(ApiError::SessionExpired);
                }
            }
        }
    }

    /// Refresh the access token unless a concurrent request already replaced
    /// the token this request was sent with.
    async fn refresh_after(&self, stale_token: Option<&str>) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.access_token();
        if current.is_some() && current.as_deref() != stale_token {
            debug!("Access token already refreshed by a concurrent request");
            return Ok(());
        }

        let Some(refresh_token) = self.refresh_token() else {
            return Err(ApiError::SessionExpired);
        };

        match self.request_refresh(&refresh_token).await {
            Ok(tokens) => {
                let mut session = self.write_session();
                if !session.replace_access(tokens.access, tokens.refresh) {
                    return Err(ApiError::SessionExpired);
                }
                if let Err(e) = session.save() {
                    warn!(error = %e, "Failed to persist refreshed session");
                }
                info!("Access token refreshed");
                Ok(())
            }
            // Credentials were not rejected, so the session survives an outage.
            Err(err @ ApiError::Unreachable { .. }) => Err(err),
            Err(err) => {
                warn!(error = %err, "Token refresh rejected, ending session");
                self.expire_session();
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&serde_json::json!({ "refresh": refresh_token }))?;
        let response = self.dispatch(&request, None).await?;
        let response = Self::check_response(response).await?;
        Self::decode(response, REFRESH_PATH).await
    }

    // ===== Verb helpers =====

    /// Send a request and decode its JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.send(&request).await?;
        Self::decode(response, &request.path).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(&ApiRequest::delete(path)).await?;
        Ok(())
    }
}
