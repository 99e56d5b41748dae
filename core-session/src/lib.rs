//! # Core Session
//!
//! Credential lifecycle management for the download core: one short-lived
//! session token, cached with its expiry, refreshed through a single-flight
//! gate with enforced minimum spacing between attempts.

pub mod credential;
pub mod error;
pub mod manager;

pub use credential::SessionCredential;
pub use error::{Result, SessionError};
pub use manager::{SessionConfig, SessionManager};
