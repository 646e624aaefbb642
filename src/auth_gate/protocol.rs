/// Two-step authentication protocol
///
/// Step 1 and step 2 each run the same pipeline: throttle check, passphrase
/// verification, attempt record, audit. Only a successful step 1 creates a
/// session, and only a successful step 2 on a live step-1 session upgrades it.
use super::{AttemptThrottle, PassphraseVerifier, SessionState, SessionStore, Step};
use crate::audit::{AuditAction, AuditEvent, AuditLog};
use crate::clock::SharedClock;
use crate::error::{GateError, GateResult};
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const RESOURCE_TYPE: &str = "admin_auth";

/// Where a request came from
#[derive(Debug, Clone)]
pub struct RequestSource {
    pub ip: String,
    pub user_agent: Option<String>,
}

impl RequestSource {
    pub fn new(ip: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent,
        }
    }
}

/// Result of a successful step
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOutcome {
    pub session_token: String,
    pub state: SessionState,
    pub expires_at: DateTime<Utc>,
}

/// Current state of a presented token
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    pub expires_at: DateTime<Utc>,
}

pub struct TwoStepAuth {
    sessions: Arc<SessionStore>,
    throttle: Arc<AttemptThrottle>,
    verifier: Arc<dyn PassphraseVerifier>,
    audit: Arc<AuditLog>,
    clock: SharedClock,
}

impl TwoStepAuth {
    pub fn new(
        sessions: Arc<SessionStore>,
        throttle: Arc<AttemptThrottle>,
        verifier: Arc<dyn PassphraseVerifier>,
        audit: Arc<AuditLog>,
        clock: SharedClock,
    ) -> Self {
        Self {
            sessions,
            throttle,
            verifier,
            audit,
            clock,
        }
    }

    /// Verify the first passphrase and open a session
    pub async fn step1(&self, source: &RequestSource, passphrase: &str) -> GateResult<AuthOutcome> {
        self.enforce_throttle(source, Step::Step1).await?;

        let valid = self.verifier.verify(Step::Step1, passphrase).await?;
        self.record_attempt(source, Step::Step1, valid).await?;

        if !valid {
            return Err(GateError::InvalidCredentials);
        }

        let (token, session) = self.sessions.create_step1_session(&source.ip).await?;
        self.audit_step(source, AuditAction::AuthStep1Success, Step::Step1)
            .await?;

        tracing::info!(ip = %source.ip, "admin step 1 verified");

        Ok(AuthOutcome {
            session_token: token,
            state: SessionState::Step1Verified,
            expires_at: session.expires_at,
        })
    }

    /// Verify the second passphrase against a live step-1 session
    pub async fn step2(
        &self,
        source: &RequestSource,
        session_token: Option<&str>,
        passphrase: &str,
    ) -> GateResult<AuthOutcome> {
        let token = session_token
            .filter(|t| !t.is_empty())
            .ok_or(GateError::MissingSession)?;

        if self.sessions.load_valid_for_step2(token).await?.is_none() {
            return Err(self.reject_session(source).await);
        }

        self.enforce_throttle(source, Step::Step2).await?;

        let valid = self.verifier.verify(Step::Step2, passphrase).await?;
        self.record_attempt(source, Step::Step2, valid).await?;

        if !valid {
            return Err(GateError::InvalidCredentials);
        }

        // The session may have lapsed while the passphrase was being checked
        let session = match self.sessions.mark_step2_verified(token).await {
            Ok(session) => session,
            Err(GateError::InvalidSession) => return Err(self.reject_session(source).await),
            Err(e) => return Err(e),
        };

        self.audit_step(source, AuditAction::AuthStep2Success, Step::Step2)
            .await?;

        tracing::info!(ip = %source.ip, "admin session fully authenticated");

        Ok(AuthOutcome {
            session_token: token.to_string(),
            state: SessionState::FullyAuthenticated,
            expires_at: session.expires_at,
        })
    }

    /// Report what a token currently grants
    pub async fn session_status(&self, token: &str) -> GateResult<SessionStatus> {
        let session = self
            .sessions
            .load_valid_for_step2(token)
            .await?
            .ok_or(GateError::InvalidSession)?;

        Ok(SessionStatus {
            state: session.state(self.clock.now()),
            expires_at: session.expires_at,
        })
    }

    async fn enforce_throttle(&self, source: &RequestSource, step: Step) -> GateResult<()> {
        if !self.throttle.is_limited(&source.ip, step).await? {
            return Ok(());
        }

        count_outcome(step, "rate_limited");
        tracing::warn!(ip = %source.ip, %step, "admin auth rate limited");

        self.audit_step(source, AuditAction::AuthRateLimited, step)
            .await?;

        let window = self.throttle.policy().window;
        Err(GateError::RateLimited {
            retry_after: window.to_std().unwrap_or_default(),
        })
    }

    async fn record_attempt(&self, source: &RequestSource, step: Step, success: bool) -> GateResult<()> {
        self.throttle.record(&source.ip, step, success).await?;

        if success {
            count_outcome(step, "success");
            return Ok(());
        }

        count_outcome(step, "failed");
        tracing::warn!(ip = %source.ip, %step, "admin passphrase rejected");

        let action = match step {
            Step::Step1 => AuditAction::AuthStep1Failed,
            Step::Step2 => AuditAction::AuthStep2Failed,
        };
        self.audit_step(source, action, step).await
    }

    async fn audit_step(&self, source: &RequestSource, action: AuditAction, step: Step) -> GateResult<()> {
        self.audit
            .append(
                AuditEvent::new(action, RESOURCE_TYPE)
                    .details(json!({
                        "step": step.as_str(),
                        "ip": source.ip,
                        "userAgent": source.user_agent,
                    }))
                    .source(&source.ip, source.user_agent.as_deref()),
            )
            .await?;

        Ok(())
    }

    /// Audit an unusable step-2 session and produce the error the caller sees
    async fn reject_session(&self, source: &RequestSource) -> GateError {
        tracing::info!(ip = %source.ip, "step 2 presented an invalid or expired session");

        if let Err(e) = self
            .audit_step(source, AuditAction::AuthSessionRejected, Step::Step2)
            .await
        {
            return e;
        }
        GateError::InvalidSession
    }
}

fn count_outcome(step: Step, outcome: &str) {
    metrics::AUTH_ATTEMPTS_TOTAL
        .with_label_values(&[step.as_str(), outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_gate::secrets::hash_passphrase;
    use crate::auth_gate::session::SessionPolicy;
    use crate::auth_gate::throttle::ThrottlePolicy;
    use crate::auth_gate::SecretStore;
    use crate::clock::{Clock, ManualClock};
    use crate::db::{file_pool, memory_pool};
    use async_trait::async_trait;
    use chrono::Duration;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STEP1: &str = "correct horse";
    const STEP2: &str = "battery staple";

    /// Plain comparison with a call counter, standing in for Argon2
    struct CountingVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PassphraseVerifier for CountingVerifier {
        async fn verify(&self, step: Step, passphrase: &str) -> GateResult<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match step {
                Step::Step1 => passphrase == STEP1,
                Step::Step2 => passphrase == STEP2,
            })
        }
    }

    struct Harness {
        pool: SqlitePool,
        clock: ManualClock,
        verifier: Arc<CountingVerifier>,
        audit: Arc<AuditLog>,
        auth: TwoStepAuth,
    }

    impl Harness {
        async fn new() -> Self {
            Self::over(memory_pool().await)
        }

        fn over(pool: SqlitePool) -> Self {
            let clock = ManualClock::new(Utc::now());
            let shared: SharedClock = Arc::new(clock.clone());
            let verifier = Arc::new(CountingVerifier {
                calls: AtomicUsize::new(0),
            });
            let audit = Arc::new(AuditLog::new(pool.clone(), shared.clone()));
            let auth = TwoStepAuth::new(
                Arc::new(SessionStore::new(
                    pool.clone(),
                    shared.clone(),
                    SessionPolicy::default(),
                )),
                Arc::new(AttemptThrottle::new(
                    pool.clone(),
                    shared.clone(),
                    ThrottlePolicy::default(),
                )),
                verifier.clone(),
                audit.clone(),
                shared,
            );
            Self {
                pool,
                clock,
                verifier,
                audit,
                auth,
            }
        }

        fn verifier_calls(&self) -> usize {
            self.verifier.calls.load(Ordering::SeqCst)
        }

        async fn count_audit(&self, action: AuditAction) -> usize {
            self.audit.recent(Some(action), 100).await.unwrap().len()
        }

        async fn attempts(&self, step: Step, success: bool) -> i64 {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM admin_auth_attempts WHERE step = ? AND success = ?",
            )
            .bind(step.as_str())
            .bind(success)
            .fetch_one(&self.pool)
            .await
            .unwrap()
        }
    }

    fn source(ip: &str) -> RequestSource {
        RequestSource::new(ip, Some("test-agent".to_string()))
    }

    #[tokio::test]
    async fn test_full_flow_and_step1_expiry() {
        let h = Harness::new().await;
        let src = source("10.0.0.1");

        let start = h.clock.now();
        let one = h.auth.step1(&src, STEP1).await.unwrap();
        assert_eq!(one.state, SessionState::Step1Verified);
        assert_eq!(one.expires_at, start + Duration::minutes(5));

        h.clock.advance(Duration::minutes(1));
        let two = h
            .auth
            .step2(&src, Some(&one.session_token), STEP2)
            .await
            .unwrap();
        assert_eq!(two.session_token, one.session_token);
        assert_eq!(two.state, SessionState::FullyAuthenticated);
        assert_eq!(two.expires_at, h.clock.now() + Duration::minutes(30));

        let status = h.auth.session_status(&two.session_token).await.unwrap();
        assert_eq!(status.state, SessionState::FullyAuthenticated);

        assert_eq!(h.count_audit(AuditAction::AuthStep1Success).await, 1);
        assert_eq!(h.count_audit(AuditAction::AuthStep2Success).await, 1);
        assert_eq!(h.attempts(Step::Step1, true).await, 1);
        assert_eq!(h.attempts(Step::Step2, true).await, 1);
        assert!(h.audit.verify_chain().await.unwrap().chain_intact);
    }

    #[tokio::test]
    async fn test_step2_after_short_ttl_is_invalid_session() {
        let h = Harness::new().await;
        let src = source("10.0.0.1");

        let one = h.auth.step1(&src, STEP1).await.unwrap();
        h.clock.advance(Duration::minutes(6));

        let expired = h
            .auth
            .step2(&src, Some(&one.session_token), STEP2)
            .await
            .unwrap_err();
        let unknown = h
            .auth
            .step2(&src, Some("never-issued"), STEP2)
            .await
            .unwrap_err();

        assert!(matches!(expired, GateError::InvalidSession));
        assert!(matches!(unknown, GateError::InvalidSession));
        assert_eq!(expired.to_string(), unknown.to_string());
        // Step 2 verifier never ran for a dead session
        assert_eq!(h.verifier_calls(), 1);
        assert_eq!(h.count_audit(AuditAction::AuthSessionRejected).await, 2);
    }

    #[tokio::test]
    async fn test_step2_requires_token() {
        let h = Harness::new().await;
        let src = source("10.0.0.1");

        assert!(matches!(
            h.auth.step2(&src, None, STEP2).await,
            Err(GateError::MissingSession)
        ));
        assert!(matches!(
            h.auth.step2(&src, Some(""), STEP2).await,
            Err(GateError::MissingSession)
        ));
        assert_eq!(h.verifier_calls(), 0);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_records_and_audits() {
        let h = Harness::new().await;
        let src = source("10.0.0.1");

        let err = h.auth.step1(&src, "wrong").await.unwrap_err();
        assert!(matches!(err, GateError::InvalidCredentials));
        assert_eq!(h.attempts(Step::Step1, false).await, 1);
        assert_eq!(h.count_audit(AuditAction::AuthStep1Failed).await, 1);

        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_sessions")
            .fetch_one(&h.pool)
            .await
            .unwrap();
        assert_eq!(sessions, 0);
    }

    #[tokio::test]
    async fn test_failed_step2_does_not_upgrade_session() {
        let h = Harness::new().await;
        let src = source("10.0.0.1");

        let one = h.auth.step1(&src, STEP1).await.unwrap();
        let err = h
            .auth
            .step2(&src, Some(&one.session_token), STEP1)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidCredentials));

        let status = h.auth.session_status(&one.session_token).await.unwrap();
        assert_eq!(status.state, SessionState::Step1Verified);
        assert_eq!(status.expires_at, one.expires_at);
        assert_eq!(h.attempts(Step::Step2, false).await, 1);
        assert_eq!(h.count_audit(AuditAction::AuthStep2Failed).await, 1);
    }

    #[tokio::test]
    async fn test_sixth_attempt_is_rate_limited_without_verification() {
        let h = Harness::new().await;
        let attacker = source("203.0.113.9");

        for _ in 0..5 {
            assert!(matches!(
                h.auth.step1(&attacker, "guess").await,
                Err(GateError::InvalidCredentials)
            ));
        }
        assert_eq!(h.verifier_calls(), 5);

        let err = h.auth.step1(&attacker, STEP1).await.unwrap_err();
        assert!(matches!(err, GateError::RateLimited { .. }));
        assert_eq!(h.verifier_calls(), 5);
        assert_eq!(h.count_audit(AuditAction::AuthRateLimited).await, 1);
        // Rejected requests are not counted as attempts
        assert_eq!(h.attempts(Step::Step1, false).await, 5);

        // Other addresses are unaffected
        assert!(h.auth.step1(&source("10.0.0.1"), STEP1).await.is_ok());

        // The window slides
        h.clock.advance(Duration::minutes(31));
        assert!(h.auth.step1(&attacker, STEP1).await.is_ok());
    }

    #[tokio::test]
    async fn test_mixed_attempts_count_toward_limit() {
        let h = Harness::new().await;
        let src = source("10.0.0.1");

        for _ in 0..3 {
            h.auth.step1(&src, STEP1).await.unwrap();
        }
        for _ in 0..2 {
            h.auth.step1(&src, "nope").await.unwrap_err();
        }

        assert!(matches!(
            h.auth.step1(&src, STEP1).await,
            Err(GateError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_step2_throttle_is_per_step() {
        let h = Harness::new().await;
        let src = source("10.0.0.1");
        let one = h.auth.step1(&src, STEP1).await.unwrap();

        for _ in 0..5 {
            h.auth
                .step2(&src, Some(&one.session_token), "nope")
                .await
                .unwrap_err();
        }
        let calls = h.verifier_calls();

        assert!(matches!(
            h.auth.step2(&src, Some(&one.session_token), STEP2).await,
            Err(GateError::RateLimited { .. })
        ));
        assert_eq!(h.verifier_calls(), calls);

        // Step 1 still has its own budget
        assert!(h.auth.step1(&src, STEP1).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_step2_keeps_flags_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::over(file_pool(&dir).await);
        let src = source("10.0.0.1");
        let one = h.auth.step1(&src, STEP1).await.unwrap();

        let (a, b) = tokio::join!(
            h.auth.step2(&src, Some(&one.session_token), STEP2),
            h.auth.step2(&src, Some(&one.session_token), STEP2),
        );
        assert!(a.is_ok() && b.is_ok());

        let (step1, step2): (bool, bool) =
            sqlx::query_as("SELECT step1_verified, step2_verified FROM admin_sessions")
                .fetch_one(&h.pool)
                .await
                .unwrap();
        assert!(step1 && step2);
    }

    #[tokio::test]
    async fn test_missing_secret_is_configuration_error() {
        let pool = memory_pool().await;
        let clock: SharedClock = Arc::new(ManualClock::new(Utc::now()));
        let secrets = Arc::new(SecretStore::new(pool.clone(), clock.clone()));
        secrets
            .provision(Step::Step1, &hash_passphrase(STEP1).unwrap())
            .await
            .unwrap();

        let auth = TwoStepAuth::new(
            Arc::new(SessionStore::new(
                pool.clone(),
                clock.clone(),
                SessionPolicy::default(),
            )),
            Arc::new(AttemptThrottle::new(
                pool.clone(),
                clock.clone(),
                ThrottlePolicy::default(),
            )),
            secrets,
            Arc::new(AuditLog::new(pool.clone(), clock.clone())),
            clock,
        );

        let src = source("10.0.0.1");
        let one = auth.step1(&src, STEP1).await.unwrap();
        let err = auth
            .step2(&src, Some(&one.session_token), STEP2)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));

        // No upgrade happened
        let status = auth.session_status(&one.session_token).await.unwrap();
        assert_eq!(status.state, SessionState::Step1Verified);
    }
}
