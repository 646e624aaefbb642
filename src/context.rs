/// Application context and dependency injection
use crate::{
    account::AccessTokenManager,
    admin::{ApplicationManager, PrivilegeGate, RoleManager},
    audit::AuditLog,
    auth_gate::{
        session::SessionPolicy, throttle::ThrottlePolicy, AttemptThrottle, PassphraseVerifier,
        SecretStore, SessionStore, Step, TwoStepAuth,
    },
    clock::{SharedClock, SystemClock},
    config::{AdminAuthConfig, GateConfig},
    db,
    error::{GateError, GateResult},
};
use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<GateConfig>,
    pub db: SqlitePool,
    pub audit: Arc<AuditLog>,
    // Two-step admin authentication
    pub secrets: Arc<SecretStore>,
    pub sessions: Arc<SessionStore>,
    pub throttle: Arc<AttemptThrottle>,
    pub two_step: Arc<TwoStepAuth>,
    // Caller identity and privileges
    pub tokens: Arc<AccessTokenManager>,
    pub roles: Arc<RoleManager>,
    pub gate: Arc<PrivilegeGate>,
    pub applications: Arc<ApplicationManager>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: GateConfig) -> GateResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let ctx = Self::with_pool(config, db, Arc::new(SystemClock));
        ctx.provision_secrets().await?;

        Ok(ctx)
    }

    /// Wire every service over an existing pool
    pub fn with_pool(config: GateConfig, db: SqlitePool, clock: SharedClock) -> Self {
        let audit = Arc::new(AuditLog::new(db.clone(), clock.clone()));

        let secrets = Arc::new(SecretStore::new(db.clone(), clock.clone()));
        let sessions = Arc::new(SessionStore::new(
            db.clone(),
            clock.clone(),
            session_policy(&config.admin_auth),
        ));
        let throttle = Arc::new(AttemptThrottle::new(
            db.clone(),
            clock.clone(),
            throttle_policy(&config.admin_auth),
        ));
        let verifier: Arc<dyn PassphraseVerifier> = secrets.clone();
        let two_step = Arc::new(TwoStepAuth::new(
            sessions.clone(),
            throttle.clone(),
            verifier,
            audit.clone(),
            clock.clone(),
        ));

        let tokens = Arc::new(AccessTokenManager::new(db.clone(), clock.clone()));
        let roles = Arc::new(RoleManager::new(db.clone(), clock.clone()));
        let gate = Arc::new(PrivilegeGate::new(roles.clone()));
        let applications = Arc::new(ApplicationManager::new(
            db.clone(),
            gate.clone(),
            audit.clone(),
            clock.clone(),
        ));

        Self {
            config: Arc::new(config),
            db,
            audit,
            secrets,
            sessions,
            throttle,
            two_step,
            tokens,
            roles,
            gate,
            applications,
        }
    }

    /// Install passphrase hashes supplied through configuration
    async fn provision_secrets(&self) -> GateResult<()> {
        let auth = &self.config.admin_auth;
        let configured = [
            (Step::Step1, auth.step1_passhash.as_deref()),
            (Step::Step2, auth.step2_passhash.as_deref()),
        ];

        for (step, passhash) in configured {
            if let Some(passhash) = passhash {
                self.secrets.provision(step, passhash).await?;
            } else if !self.secrets.is_provisioned(step).await? {
                tracing::warn!(
                    "No admin secret for {}; admin sign-in will fail until one is provisioned",
                    step
                );
            }
        }

        Ok(())
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &GateConfig) -> GateResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                GateError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}

fn session_policy(auth: &AdminAuthConfig) -> SessionPolicy {
    SessionPolicy {
        step1_ttl: Duration::seconds(auth.step1_ttl_secs),
        authenticated_ttl: Duration::seconds(auth.authenticated_ttl_secs),
    }
}

fn throttle_policy(auth: &AdminAuthConfig) -> ThrottlePolicy {
    ThrottlePolicy {
        window: Duration::seconds(auth.throttle_window_secs),
        max_attempts: auth.throttle_max_attempts,
    }
}
