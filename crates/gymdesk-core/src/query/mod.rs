//! Query and mutation handles over the API client.
//!
//! This module provides:
//! - `QueryClient`: shared response cache plus in-flight registry
//! - `ApiQuery`: cached, deduplicated, cancellable reads with
//!   loading/error/data state
//! - `ApiMutation`: writes with loading/error/data state and callbacks
//! - `InFlight`: the request deduplication primitive

pub mod client;
pub mod in_flight;
pub mod mutation;
pub mod state;
pub mod use_api;

use std::time::Duration;

pub use client::QueryClient;
pub use in_flight::InFlight;
pub use mutation::{ApiMutation, MutationOptions};
pub use state::FetchState;
pub use use_api::{ApiQuery, QueryOptions};

/// Cache lifetime for query results unless the caller sets one.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
