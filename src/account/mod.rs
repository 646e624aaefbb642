/// Caller identity
///
/// Resolves bearer credentials to the user they were issued for. Only digests
/// of credentials are stored.

use crate::auth_gate::session::{generate_token, token_digest};
use crate::clock::{to_millis, SharedClock};
use crate::error::{GateError, GateResult};
use chrono::Duration;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Identity resolved from a bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: String,
}

/// Bearer credential store
pub struct AccessTokenManager {
    db: SqlitePool,
    clock: SharedClock,
}

impl AccessTokenManager {
    pub fn new(db: SqlitePool, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Issue a credential for a user
    pub async fn issue(&self, user_id: &str, ttl: Duration) -> GateResult<String> {
        if user_id.trim().is_empty() {
            return Err(GateError::Validation("User id cannot be empty".to_string()));
        }

        let token = generate_token();
        let now = self.clock.now();

        sqlx::query(
            r#"
            INSERT INTO access_tokens (token_hash, user_id, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(token_digest(&token))
        .bind(user_id)
        .bind(to_millis(now))
        .bind(to_millis(now + ttl))
        .execute(&self.db)
        .await?;

        Ok(token)
    }

    /// Resolve a credential, failing with `Unauthorized` if unknown, revoked or expired
    pub async fn resolve(&self, token: &str) -> GateResult<CallerIdentity> {
        let row = sqlx::query(
            r#"
            SELECT user_id FROM access_tokens
            WHERE token_hash = ? AND revoked = 0 AND expires_at > ?
            "#,
        )
        .bind(token_digest(token))
        .bind(to_millis(self.clock.now()))
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::Unauthorized("Invalid or expired credential".to_string()))?;

        Ok(CallerIdentity {
            user_id: row.try_get("user_id")?,
        })
    }

    /// Revoke a credential
    pub async fn revoke(&self, token: &str) -> GateResult<()> {
        let result = sqlx::query("UPDATE access_tokens SET revoked = 1 WHERE token_hash = ? AND revoked = 0")
            .bind(token_digest(token))
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GateError::NotFound("No active credential".to_string()));
        }

        Ok(())
    }

    /// Remove expired and revoked credentials
    pub async fn purge_expired(&self) -> GateResult<u64> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE expires_at <= ? OR revoked = 1")
            .bind(to_millis(self.clock.now()))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::memory_pool;
    use chrono::Utc;
    use std::sync::Arc;

    async fn manager() -> (ManualClock, AccessTokenManager) {
        let clock = ManualClock::new(Utc::now());
        let manager = AccessTokenManager::new(memory_pool().await, Arc::new(clock.clone()));
        (clock, manager)
    }

    #[tokio::test]
    async fn test_issue_and_resolve() {
        let (_clock, manager) = manager().await;
        let token = manager.issue("user-1", Duration::hours(1)).await.unwrap();

        let caller = manager.resolve(&token).await.unwrap();
        assert_eq!(caller.user_id, "user-1");

        assert!(matches!(
            manager.resolve("not-a-token").await,
            Err(GateError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_and_revoked_credentials() {
        let (clock, manager) = manager().await;
        let short = manager.issue("user-1", Duration::minutes(1)).await.unwrap();
        let revoked = manager.issue("user-2", Duration::hours(1)).await.unwrap();

        manager.revoke(&revoked).await.unwrap();
        assert!(manager.revoke(&revoked).await.is_err());
        assert!(manager.resolve(&revoked).await.is_err());

        clock.advance(Duration::minutes(2));
        assert!(manager.resolve(&short).await.is_err());

        assert_eq!(manager.purge_expired().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_user_rejected() {
        let (_clock, manager) = manager().await;
        assert!(matches!(
            manager.issue("  ", Duration::hours(1)).await,
            Err(GateError::Validation(_))
        ));
    }
}
