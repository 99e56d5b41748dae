//! Credential Issuance Abstraction
//!
//! Session credentials come from an external issuing mechanism that needs a
//! browser environment on the host. The core only consumes the issued token
//! and classifies the failure modes; launching and driving the environment is
//! entirely the implementation's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// A freshly issued session credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCredential {
    /// Opaque bearer token.
    pub token: String,
    /// Absolute expiry instant (UTC).
    pub expires_at: DateTime<Utc>,
}

/// External credential issuer.
///
/// `timeout` bounds a single attempt and `retry_attempts` bounds how many
/// times the implementation may retry internally. When the issuing
/// environment itself is missing (no usable browser on the host), the
/// implementation must fail with [`BridgeError::NotAvailable`] so callers can
/// surface an actionable message instead of a generic failure.
///
/// [`BridgeError::NotAvailable`]: crate::error::BridgeError::NotAvailable
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, timeout: Duration, retry_attempts: u32) -> Result<IssuedCredential>;
}
