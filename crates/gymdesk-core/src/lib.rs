//! gymdesk-core - client library for the gym front-desk REST backend.
//!
//! The crate is organised leaves first:
//! - [`api`]: authenticated HTTP client with single-flight token refresh
//! - [`auth`]: persisted access/refresh token pair and user profile
//! - [`cache`]: expiring key/value store and cache-key conventions
//! - [`query`]: fetch and mutation handles with loading/error state,
//!   request deduplication and cancellation
//! - [`services`]: members, payments, attendance, admin and analytics
//!   wrappers over the HTTP client
//! - [`models`]: domain types and response-shape normalization

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod query;
pub mod services;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthStatus, Session, SessionData};
pub use cache::{CacheKey, TtlCache};
pub use config::Config;
pub use query::{ApiMutation, ApiQuery, FetchState, QueryClient, QueryOptions};
pub use services::Gym;
