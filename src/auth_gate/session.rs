/// Admin session store
///
/// Sessions are keyed by the SHA-256 of an opaque random token; the raw token
/// only ever lives with the client. Expiry is checked on every read, so an
/// expired row behaves exactly like a missing one.
use super::SessionState;
use crate::clock::{from_millis, to_millis, SharedClock};
use crate::error::{GateError, GateResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

const TOKEN_BYTES: usize = 32;

/// Session lifetimes
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Window to finish step 2 after step 1
    pub step1_ttl: Duration,
    /// Lifetime granted (and re-granted) by step 2
    pub authenticated_ttl: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            step1_ttl: Duration::minutes(5),
            authenticated_ttl: Duration::minutes(30),
        }
    }
}

/// Stored session record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    pub ip_address: String,
    pub step1_verified: bool,
    pub step2_verified: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AdminSession {
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if now >= self.expires_at || !self.step1_verified {
            SessionState::Unauthenticated
        } else if self.step2_verified {
            SessionState::FullyAuthenticated
        } else {
            SessionState::Step1Verified
        }
    }
}

/// Generate a fresh opaque session token
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest under which a token is stored
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub struct SessionStore {
    db: SqlitePool,
    clock: SharedClock,
    policy: SessionPolicy,
}

impl SessionStore {
    pub fn new(db: SqlitePool, clock: SharedClock, policy: SessionPolicy) -> Self {
        Self { db, clock, policy }
    }

    /// Create a session that has passed step 1
    pub async fn create_step1_session(&self, ip: &str) -> GateResult<(String, AdminSession)> {
        let token = generate_token();
        let now = self.clock.now();
        let session = AdminSession {
            ip_address: ip.to_string(),
            step1_verified: true,
            step2_verified: false,
            created_at: now,
            expires_at: now + self.policy.step1_ttl,
        };

        sqlx::query(
            r#"
            INSERT INTO admin_sessions (token_hash, ip_address, step1_verified, step2_verified, created_at, expires_at)
            VALUES (?, ?, 1, 0, ?, ?)
            "#,
        )
        .bind(token_digest(&token))
        .bind(ip)
        .bind(to_millis(session.created_at))
        .bind(to_millis(session.expires_at))
        .execute(&self.db)
        .await?;

        Ok((token, session))
    }

    /// Session that may attempt step 2, or `None` if unknown or expired
    pub async fn load_valid_for_step2(&self, token: &str) -> GateResult<Option<AdminSession>> {
        let row = sqlx::query(
            r#"
            SELECT ip_address, step1_verified, step2_verified, created_at, expires_at
            FROM admin_sessions
            WHERE token_hash = ? AND step1_verified = 1 AND expires_at > ?
            "#,
        )
        .bind(token_digest(token))
        .bind(to_millis(self.clock.now()))
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    /// Fully authenticated session, or `None`
    pub async fn load_authenticated(&self, token: &str) -> GateResult<Option<AdminSession>> {
        let session = self.load_valid_for_step2(token).await?;
        Ok(session.filter(|s| s.step2_verified))
    }

    /// Set `step2_verified` and push expiry to the authenticated window.
    ///
    /// A single conditional update: it only applies while the session is still
    /// valid for step 2, and repeating it just extends the expiry again.
    pub async fn mark_step2_verified(&self, token: &str) -> GateResult<AdminSession> {
        let now = self.clock.now();

        let row = sqlx::query(
            r#"
            UPDATE admin_sessions
            SET step2_verified = 1, expires_at = ?
            WHERE token_hash = ? AND step1_verified = 1 AND expires_at > ?
            RETURNING ip_address, step1_verified, step2_verified, created_at, expires_at
            "#,
        )
        .bind(to_millis(now + self.policy.authenticated_ttl))
        .bind(token_digest(token))
        .bind(to_millis(now))
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => session_from_row(&row),
            None => Err(GateError::InvalidSession),
        }
    }

    /// Delete expired rows. Storage hygiene only; reads never depend on it.
    pub async fn purge_expired(&self) -> GateResult<u64> {
        let result = sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= ?")
            .bind(to_millis(self.clock.now()))
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

fn session_from_row(row: &SqliteRow) -> GateResult<AdminSession> {
    Ok(AdminSession {
        ip_address: row.try_get("ip_address")?,
        step1_verified: row.try_get("step1_verified")?,
        step2_verified: row.try_get("step2_verified")?,
        created_at: from_millis(row.try_get("created_at")?),
        expires_at: from_millis(row.try_get("expires_at")?),
    })
}
