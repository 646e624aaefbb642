/// Admin secrets and passphrase verification
use super::Step;
use crate::clock::{to_millis, SharedClock};
use crate::error::{GateError, GateResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Checks a supplied passphrase against the secret registered for a step
#[async_trait]
pub trait PassphraseVerifier: Send + Sync {
    /// `Ok(false)` on mismatch; `GateError::Configuration` when no usable
    /// secret exists for `step`.
    async fn verify(&self, step: Step, passphrase: &str) -> GateResult<bool>;
}

/// Hash a passphrase into an Argon2id PHC string
pub fn hash_passphrase(passphrase: &str) -> GateResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GateError::Internal(format!("Passphrase hashing failed: {}", e)))
}

/// Secrets stored in `admin_secrets`
pub struct SecretStore {
    db: SqlitePool,
    clock: SharedClock,
}

impl SecretStore {
    pub fn new(db: SqlitePool, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Install or replace the hash for a step
    pub async fn provision(&self, step: Step, passhash: &str) -> GateResult<()> {
        PasswordHash::new(passhash).map_err(|e| {
            GateError::Configuration(format!("Secret for {} is not a PHC hash: {}", step, e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO admin_secrets (label, passhash, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(label) DO UPDATE SET passhash = excluded.passhash, updated_at = excluded.updated_at
            "#,
        )
        .bind(step.as_str())
        .bind(passhash)
        .bind(to_millis(self.clock.now()))
        .execute(&self.db)
        .await?;

        tracing::info!("Provisioned admin secret for {}", step);

        Ok(())
    }

    pub async fn is_provisioned(&self, step: Step) -> GateResult<bool> {
        Ok(self.passhash(step).await?.is_some())
    }

    async fn passhash(&self, step: Step) -> GateResult<Option<String>> {
        let hash = sqlx::query_scalar("SELECT passhash FROM admin_secrets WHERE label = ?")
            .bind(step.as_str())
            .fetch_optional(&self.db)
            .await?;

        Ok(hash)
    }
}

#[async_trait]
impl PassphraseVerifier for SecretStore {
    async fn verify(&self, step: Step, passphrase: &str) -> GateResult<bool> {
        let stored = self.passhash(step).await?.ok_or_else(|| {
            GateError::Configuration(format!("Admin secret for {} not configured", step))
        })?;

        let passphrase = passphrase.to_owned();
        // CPU-bound
        tokio::task::spawn_blocking(move || -> GateResult<bool> {
            let parsed = PasswordHash::new(&stored).map_err(|e| {
                GateError::Configuration(format!("Stored secret for {} is malformed: {}", step, e))
            })?;

            Ok(Argon2::default()
                .verify_password(passphrase.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| GateError::Internal(format!("Verification task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::db::memory_pool;
    use std::sync::Arc;

    async fn store() -> SecretStore {
        SecretStore::new(memory_pool().await, Arc::new(SystemClock))
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_passphrase("open sesame").unwrap();
        let b = hash_passphrase("open sesame").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(!a.contains("open sesame"));
    }

    #[tokio::test]
    async fn test_verify_against_provisioned_secret() {
        let store = store().await;
        store
            .provision(Step::Step1, &hash_passphrase("first gate").unwrap())
            .await
            .unwrap();

        assert!(store.verify(Step::Step1, "first gate").await.unwrap());
        assert!(!store.verify(Step::Step1, "First gate").await.unwrap());
        assert!(!store.verify(Step::Step1, "").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_secret_is_configuration_error() {
        let store = store().await;
        store
            .provision(Step::Step1, &hash_passphrase("first gate").unwrap())
            .await
            .unwrap();

        assert!(!store.is_provisioned(Step::Step2).await.unwrap());
        let err = store.verify(Step::Step2, "anything").await.unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_provision_rejects_plaintext_and_replaces() {
        let store = store().await;

        let err = store.provision(Step::Step1, "hunter2").await.unwrap_err();
        assert!(matches!(err, GateError::Configuration(_)));

        store
            .provision(Step::Step1, &hash_passphrase("old").unwrap())
            .await
            .unwrap();
        store
            .provision(Step::Step1, &hash_passphrase("new").unwrap())
            .await
            .unwrap();

        assert!(!store.verify(Step::Step1, "old").await.unwrap());
        assert!(store.verify(Step::Step1, "new").await.unwrap());
    }
}
