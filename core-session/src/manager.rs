//! # Session Manager
//!
//! Owns the single process-wide session credential and its refresh protocol.
//!
//! ## Overview
//!
//! Fetch requests are authorized by a short-lived opaque token issued through
//! an external browser-bound mechanism ([`CredentialIssuer`]). The manager
//! caches the current token, refreshes it when it nears expiry or a caller
//! forces it, and guards two invariants:
//!
//! - **Single-flight**: at most one refresh is in flight process-wide.
//!   Concurrent requesters park on the refresh gate and accept the result of
//!   the refresh that completed while they waited instead of issuing again.
//! - **Minimum spacing**: refresh attempts are separated by a configurable
//!   interval (default 2 seconds); a caller arriving sooner waits out the
//!   remainder before issuing.
//!
//! Refresh failures are classified: a missing issuing environment surfaces
//! as the distinct [`SessionError::IssuerUnavailable`] so callers can show an
//! actionable message; everything else propagates as
//! [`SessionError::IssueFailed`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_session::{SessionConfig, SessionManager};
//! use std::sync::Arc;
//!
//! let manager = SessionManager::new(issuer, clock, event_bus, SessionConfig::default());
//!
//! // Cheap when the cached credential is still valid.
//! let credential = manager.ensure_valid(false).await?;
//!
//! // After an authorization failure downstream:
//! let credential = manager.ensure_valid(true).await?;
//! ```

use crate::credential::SessionCredential;
use crate::error::{Result, SessionError};
use bridge_traits::error::BridgeError;
use bridge_traits::issuer::CredentialIssuer;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for a single issuance attempt.
    pub issue_timeout: Duration,

    /// Retry attempts the issuer may make internally.
    pub issue_retry_attempts: u32,

    /// Seconds before expiry at which a credential counts as stale.
    pub expiry_buffer_secs: i64,

    /// Minimum spacing between refresh attempts.
    pub min_refresh_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            issue_timeout: Duration::from_secs(15),
            issue_retry_attempts: 3,
            // Issued tokens live about three minutes.
            expiry_buffer_secs: 10,
            min_refresh_interval: Duration::from_secs(2),
        }
    }
}

/// Refresh bookkeeping guarded by the single-flight gate.
#[derive(Debug, Default)]
struct RefreshGate {
    last_refresh_started: Option<DateTime<Utc>>,
    last_refresh_finished: Option<DateTime<Utc>>,
}

/// Stateful credential lifecycle service.
///
/// Passed by handle (`Arc`) to every component that needs authorization;
/// there is no ambient module state.
pub struct SessionManager {
    issuer: Arc<dyn CredentialIssuer>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    config: SessionConfig,
    current: RwLock<Option<SessionCredential>>,
    refresh_gate: Mutex<RefreshGate>,
}

impl SessionManager {
    pub fn new(
        issuer: Arc<dyn CredentialIssuer>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        config: SessionConfig,
    ) -> Self {
        Self {
            issuer,
            clock,
            event_bus,
            config,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(RefreshGate::default()),
        }
    }

    /// Returns a credential valid for immediate use, refreshing when needed.
    ///
    /// With `force_refresh` the cached credential is bypassed, except that a
    /// refresh completed while this caller waited on the gate satisfies the
    /// request (it cannot be the credential the caller deemed bad).
    ///
    /// # Errors
    ///
    /// - [`SessionError::IssuerUnavailable`] when the issuing environment is
    ///   missing on this host
    /// - [`SessionError::IssueFailed`] for any other issuance failure
    #[instrument(skip(self))]
    pub async fn ensure_valid(&self, force_refresh: bool) -> Result<SessionCredential> {
        if !force_refresh {
            if let Some(credential) = self.cached_if_fresh().await {
                debug!("cached credential still valid, no refresh needed");
                return Ok(credential);
            }
        }

        let requested_at = self.clock.now();

        // Single-flight: all refreshes serialize here. Waiters park on the
        // gate while a refresh is in flight.
        let mut gate = self.refresh_gate.lock().await;

        // A refresh that finished after this request began satisfies it,
        // forced or not.
        if let Some(finished) = gate.last_refresh_finished {
            if finished > requested_at {
                if let Some(credential) = self.cached_if_fresh().await {
                    debug!("another caller refreshed while we waited");
                    return Ok(credential);
                }
            }
        }

        if !force_refresh {
            if let Some(credential) = self.cached_if_fresh().await {
                return Ok(credential);
            }
        }

        // Minimum spacing between refresh attempts, measured from the last
        // attempt regardless of which caller made it.
        if let Some(started) = gate.last_refresh_started {
            let min = chrono::Duration::from_std(self.config.min_refresh_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(2));
            let elapsed = self.clock.now() - started;
            if elapsed < min {
                let wait = (min - elapsed).to_std().unwrap_or_default();
                debug!(wait_ms = wait.as_millis() as u64, "spacing out refresh");
                tokio::time::sleep(wait).await;
            }
        }

        gate.last_refresh_started = Some(self.clock.now());
        self.event_bus
            .emit(CoreEvent::Session(SessionEvent::Refreshing))
            .ok();
        info!("refreshing session credential");

        let issued = self
            .issuer
            .issue(self.config.issue_timeout, self.config.issue_retry_attempts)
            .await
            .map_err(|e| {
                let error = classify_issue_error(e);
                warn!("credential refresh failed: {}", error);
                self.event_bus
                    .emit(CoreEvent::Session(SessionEvent::RefreshFailed {
                        message: error.to_string(),
                        recoverable: !matches!(error, SessionError::IssuerUnavailable(_)),
                    }))
                    .ok();
                error
            })?;

        let credential = SessionCredential::new(issued.token, issued.expires_at);

        // Cache update and finish stamp happen before the gate opens, so the
        // swap is atomic from any other caller's point of view.
        {
            let mut current = self.current.write().await;
            *current = Some(credential.clone());
        }
        gate.last_refresh_finished = Some(self.clock.now());

        self.event_bus
            .emit(CoreEvent::Session(SessionEvent::Refreshed {
                expires_at: credential.expires_at.timestamp(),
            }))
            .ok();
        info!(expires_at = %credential.expires_at, "session credential refreshed");

        Ok(credential)
    }

    /// Forces a refresh regardless of the cached credential's state.
    pub async fn force_refresh(&self) -> Result<SessionCredential> {
        self.ensure_valid(true).await
    }

    /// Snapshot of the cached credential, if any, without validity checks.
    pub async fn current(&self) -> Option<SessionCredential> {
        self.current.read().await.clone()
    }

    /// Drops the cached credential; the next `ensure_valid` will refresh.
    pub async fn invalidate(&self) {
        let mut current = self.current.write().await;
        *current = None;
        debug!("session credential invalidated");
    }

    async fn cached_if_fresh(&self) -> Option<SessionCredential> {
        let now = self.clock.now();
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|c| !c.is_expired_with_buffer(now, self.config.expiry_buffer_secs))
            .cloned()
    }
}

fn classify_issue_error(error: BridgeError) -> SessionError {
    match error {
        BridgeError::NotAvailable(message) => SessionError::IssuerUnavailable(message),
        other => SessionError::IssueFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::issuer::IssuedCredential;
    use bridge_traits::time::SystemClock;
    use futures::future::join_all;

    struct CountingIssuer {
        issued: Mutex<u32>,
        issue_delay: Duration,
        token_lifetime_secs: i64,
        fail_with: Option<fn() -> BridgeError>,
    }

    impl CountingIssuer {
        fn new() -> Self {
            Self {
                issued: Mutex::new(0),
                issue_delay: Duration::from_millis(0),
                token_lifetime_secs: 180,
                fail_with: None,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.issue_delay = delay;
            self
        }

        fn short_lived(mut self, secs: i64) -> Self {
            self.token_lifetime_secs = secs;
            self
        }

        fn failing(mut self, f: fn() -> BridgeError) -> Self {
            self.fail_with = Some(f);
            self
        }

        async fn issue_count(&self) -> u32 {
            *self.issued.lock().await
        }
    }

    #[async_trait::async_trait]
    impl CredentialIssuer for CountingIssuer {
        async fn issue(
            &self,
            _timeout: Duration,
            _retry_attempts: u32,
        ) -> BridgeResult<IssuedCredential> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            tokio::time::sleep(self.issue_delay).await;
            let n = {
                let mut issued = self.issued.lock().await;
                *issued += 1;
                *issued
            };
            Ok(IssuedCredential {
                token: format!("token-{}", n),
                expires_at: Utc::now() + chrono::Duration::seconds(self.token_lifetime_secs),
            })
        }
    }

    fn manager_with(issuer: Arc<CountingIssuer>, config: SessionConfig) -> SessionManager {
        SessionManager::new(issuer, Arc::new(SystemClock), EventBus::new(100), config)
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            min_refresh_interval: Duration::from_millis(0),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_cached_credential_short_circuits() {
        let issuer = Arc::new(CountingIssuer::new());
        let manager = manager_with(issuer.clone(), fast_config());

        let first = manager.ensure_valid(false).await.unwrap();
        let second = manager.ensure_valid(false).await.unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(issuer.issue_count().await, 1);
    }

    #[tokio::test]
    async fn test_force_refresh_issues_again() {
        let issuer = Arc::new(CountingIssuer::new());
        let manager = manager_with(issuer.clone(), fast_config());

        let first = manager.ensure_valid(false).await.unwrap();
        let second = manager.force_refresh().await.unwrap();

        assert_ne!(first.token, second.token);
        assert_eq!(issuer.issue_count().await, 2);
    }

    #[tokio::test]
    async fn test_expired_credential_triggers_refresh() {
        let issuer = Arc::new(CountingIssuer::new().short_lived(-5));
        let manager = manager_with(issuer.clone(), fast_config());

        manager.ensure_valid(false).await.unwrap();
        manager.ensure_valid(false).await.unwrap();

        // Both calls issue because each token arrives already expired.
        assert_eq!(issuer.issue_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_single_flight() {
        let issuer = Arc::new(CountingIssuer::new().slow(Duration::from_millis(50)));
        let manager = Arc::new(manager_with(issuer.clone(), fast_config()));

        let callers = (0..4).map(|_| {
            let manager = manager.clone();
            async move { manager.ensure_valid(false).await }
        });
        let results = join_all(callers).await;

        for result in results {
            assert_eq!(result.unwrap().token, "token-1");
        }
        assert_eq!(issuer.issue_count().await, 1);
    }

    #[tokio::test]
    async fn test_waiting_forced_caller_accepts_fresh_credential() {
        let issuer = Arc::new(CountingIssuer::new().slow(Duration::from_millis(50)));
        let manager = Arc::new(manager_with(issuer.clone(), fast_config()));

        let racing = manager.clone();
        let forced = tokio::spawn(async move {
            // Arrives while the unforced refresh below is in flight.
            tokio::time::sleep(Duration::from_millis(10)).await;
            racing.ensure_valid(true).await
        });

        let unforced = manager.ensure_valid(false).await.unwrap();
        let forced = forced.await.unwrap().unwrap();

        assert_eq!(unforced.token, forced.token);
        assert_eq!(issuer.issue_count().await, 1);
    }

    #[tokio::test]
    async fn test_minimum_spacing_between_refreshes() {
        let issuer = Arc::new(CountingIssuer::new());
        let config = SessionConfig {
            min_refresh_interval: Duration::from_millis(120),
            ..SessionConfig::default()
        };
        let manager = manager_with(issuer.clone(), config);

        let started = std::time::Instant::now();
        manager.ensure_valid(false).await.unwrap();
        manager.force_refresh().await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(120));
        assert_eq!(issuer.issue_count().await, 2);
    }

    #[tokio::test]
    async fn test_missing_environment_is_distinct() {
        let issuer = Arc::new(
            CountingIssuer::new()
                .failing(|| BridgeError::NotAvailable("no chromium-based browser found".into())),
        );
        let manager = manager_with(issuer.clone(), fast_config());

        let error = manager.ensure_valid(false).await.unwrap_err();
        assert!(matches!(error, SessionError::IssuerUnavailable(_)));
    }

    #[tokio::test]
    async fn test_generic_failure_propagates() {
        let issuer = Arc::new(
            CountingIssuer::new()
                .failing(|| BridgeError::OperationFailed("token helper crashed".into())),
        );
        let manager = manager_with(issuer.clone(), fast_config());

        let error = manager.ensure_valid(false).await.unwrap_err();
        assert!(matches!(error, SessionError::IssueFailed(_)));
    }

    #[tokio::test]
    async fn test_refresh_events_emitted() {
        let issuer = Arc::new(CountingIssuer::new());
        let event_bus = EventBus::new(100);
        let mut events = event_bus.subscribe();
        let manager = SessionManager::new(
            issuer,
            Arc::new(SystemClock),
            event_bus.clone(),
            fast_config(),
        );

        manager.ensure_valid(false).await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Session(SessionEvent::Refreshing)
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Session(SessionEvent::Refreshed { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalidate_clears_cache() {
        let issuer = Arc::new(CountingIssuer::new());
        let manager = manager_with(issuer.clone(), fast_config());

        manager.ensure_valid(false).await.unwrap();
        manager.invalidate().await;
        assert!(manager.current().await.is_none());

        manager.ensure_valid(false).await.unwrap();
        assert_eq!(issuer.issue_count().await, 2);
    }
}
