//! REST API client module for the gym backend.
//!
//! This module provides the `ApiClient` for talking to the backend's JSON
//! endpoints. Every request carries the current bearer access token; a 401
//! triggers one token refresh and one retry of the original request.
//!
//! Transport failures (timeouts, DNS, refused connections) are normalized
//! into a single `ApiError::Unreachable` shape.

pub mod client;
pub mod error;
pub mod request;

pub use client::{ApiClient, ClientOptions};
pub use error::{ApiError, NetworkCause};
pub use request::ApiRequest;
