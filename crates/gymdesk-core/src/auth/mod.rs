//! Authentication module for managing the access/refresh token pair.
//!
//! This module provides:
//! - `Session`: token pair plus cached user profile, persisted to disk
//! - `AuthStatus`: observable sign-in state published by the API client
//!
//! Tokens are created by login, replaced by refresh and destroyed by logout
//! or by a failed refresh.

pub mod session;

pub use session::{AuthStatus, Session, SessionData};
