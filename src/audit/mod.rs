/// Audit Log
///
/// Append-only record of security-relevant events. Every entry carries the
/// SHA-256 of its predecessor so edits, deletions and insertions are
/// detectable by `verify_chain`.

use crate::clock::{from_millis, to_millis, SharedClock};
use crate::error::{GateError, GateResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::fmt;
use tokio::sync::Mutex;

/// `prev_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Auditable actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AuthStep1Success,
    AuthStep1Failed,
    AuthStep2Success,
    AuthStep2Failed,
    AuthRateLimited,
    AuthSessionRejected,
    ApplicationApproved,
    ApplicationRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AuthStep1Success => "auth_step1_success",
            AuditAction::AuthStep1Failed => "auth_step1_failed",
            AuditAction::AuthStep2Success => "auth_step2_success",
            AuditAction::AuthStep2Failed => "auth_step2_failed",
            AuditAction::AuthRateLimited => "auth_rate_limited",
            AuditAction::AuthSessionRejected => "auth_session_rejected",
            AuditAction::ApplicationApproved => "application_approved",
            AuditAction::ApplicationRejected => "application_rejected",
        }
    }

    pub fn parse(s: &str) -> GateResult<Self> {
        match s {
            "auth_step1_success" => Ok(AuditAction::AuthStep1Success),
            "auth_step1_failed" => Ok(AuditAction::AuthStep1Failed),
            "auth_step2_success" => Ok(AuditAction::AuthStep2Success),
            "auth_step2_failed" => Ok(AuditAction::AuthStep2Failed),
            "auth_rate_limited" => Ok(AuditAction::AuthRateLimited),
            "auth_session_rejected" => Ok(AuditAction::AuthSessionRejected),
            "application_approved" => Ok(AuditAction::ApplicationApproved),
            "application_rejected" => Ok(AuditAction::ApplicationRejected),
            _ => Err(GateError::Internal(format!("Unknown audit action: {}", s))),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event about to be appended
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource_type: impl Into<String>) -> Self {
        Self {
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            details: serde_json::Value::Object(Default::default()),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn source(mut self, ip_address: &str, user_agent: Option<&str>) -> Self {
        self.ip_address = Some(ip_address.to_string());
        self.user_agent = user_agent.map(str::to_string);
        self
    }
}

/// A persisted audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: String,
    pub entry_hash: String,
}

/// Outcome of walking the hash chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub total_entries: u64,
    pub chain_intact: bool,
    pub first_break_at: Option<i64>,
}

#[derive(Serialize)]
struct HashInput<'a> {
    prev_hash: &'a str,
    action: &'a str,
    resource_type: &'a str,
    resource_id: Option<&'a str>,
    details: &'a str,
    ip_address: Option<&'a str>,
    user_agent: Option<&'a str>,
    timestamp: i64,
}

impl HashInput<'_> {
    fn digest(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        hex::encode(Sha256::digest(json.as_bytes()))
    }
}

/// Append-only audit sink backed by the `audit_logs` table
pub struct AuditLog {
    db: SqlitePool,
    clock: SharedClock,
    // Appends are serialized so each entry links to the true predecessor
    append_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(db: SqlitePool, clock: SharedClock) -> Self {
        Self {
            db,
            clock,
            append_lock: Mutex::new(()),
        }
    }

    /// Append an event, returning its id
    pub async fn append(&self, event: AuditEvent) -> GateResult<i64> {
        let details = serde_json::to_string(&event.details)
            .map_err(|e| GateError::Internal(format!("Unserializable audit details: {}", e)))?;

        let _guard = self.append_lock.lock().await;

        let prev_hash: String = sqlx::query_scalar(
            "SELECT entry_hash FROM audit_logs ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?
        .unwrap_or_else(|| GENESIS_HASH.to_string());

        let timestamp = to_millis(self.clock.now());
        let entry_hash = HashInput {
            prev_hash: &prev_hash,
            action: event.action.as_str(),
            resource_type: &event.resource_type,
            resource_id: event.resource_id.as_deref(),
            details: &details,
            ip_address: event.ip_address.as_deref(),
            user_agent: event.user_agent.as_deref(),
            timestamp,
        }
        .digest();

        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs
                (action, resource_type, resource_id, details, ip_address, user_agent, timestamp, prev_hash, entry_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.action.as_str())
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(&details)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(timestamp)
        .bind(&prev_hash)
        .bind(&entry_hash)
        .execute(&self.db)
        .await?;

        tracing::debug!(action = %event.action, "audit entry appended");

        Ok(result.last_insert_rowid())
    }

    /// Most recent entries first, optionally filtered by action
    pub async fn recent(
        &self,
        action: Option<AuditAction>,
        limit: i64,
    ) -> GateResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, action, resource_type, resource_id, details, ip_address, user_agent,
                   timestamp, prev_hash, entry_hash
            FROM audit_logs
            WHERE (?1 IS NULL OR action = ?1)
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(action.map(|a| a.as_str()))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    /// Recompute every entry hash from genesis
    pub async fn verify_chain(&self) -> GateResult<ChainVerification> {
        let rows = sqlx::query(
            r#"
            SELECT id, action, resource_type, resource_id, details, ip_address, user_agent,
                   timestamp, prev_hash, entry_hash
            FROM audit_logs
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut expected_prev = GENESIS_HASH.to_string();
        let mut first_break_at = None;

        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let prev_hash: String = row.try_get("prev_hash")?;
            let entry_hash: String = row.try_get("entry_hash")?;
            let action: String = row.try_get("action")?;
            let resource_type: String = row.try_get("resource_type")?;
            let resource_id: Option<String> = row.try_get("resource_id")?;
            let details: String = row.try_get("details")?;
            let ip_address: Option<String> = row.try_get("ip_address")?;
            let user_agent: Option<String> = row.try_get("user_agent")?;
            let timestamp: i64 = row.try_get("timestamp")?;

            let recomputed = HashInput {
                prev_hash: &prev_hash,
                action: &action,
                resource_type: &resource_type,
                resource_id: resource_id.as_deref(),
                details: &details,
                ip_address: ip_address.as_deref(),
                user_agent: user_agent.as_deref(),
                timestamp,
            }
            .digest();

            if prev_hash != expected_prev || recomputed != entry_hash {
                first_break_at = Some(id);
                break;
            }
            expected_prev = entry_hash;
        }

        if let Some(id) = first_break_at {
            tracing::warn!("Audit chain broken at entry {}", id);
        }

        Ok(ChainVerification {
            total_entries: rows.len() as u64,
            chain_intact: first_break_at.is_none(),
            first_break_at,
        })
    }

    fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> GateResult<AuditLogEntry> {
        let action: String = row.try_get("action")?;
        let details: String = row.try_get("details")?;

        Ok(AuditLogEntry {
            id: row.try_get("id")?,
            action: AuditAction::parse(&action)?,
            resource_type: row.try_get("resource_type")?,
            resource_id: row.try_get("resource_id")?,
            details: serde_json::from_str(&details)
                .map_err(|e| GateError::Internal(format!("Corrupt audit details: {}", e)))?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            timestamp: from_millis(row.try_get("timestamp")?),
            prev_hash: row.try_get("prev_hash")?,
            entry_hash: row.try_get("entry_hash")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::db::memory_pool;
    use serde_json::json;
    use std::sync::Arc;

    async fn audit_log() -> (SqlitePool, AuditLog) {
        let pool = memory_pool().await;
        let log = AuditLog::new(pool.clone(), Arc::new(SystemClock));
        (pool, log)
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in [
            AuditAction::AuthStep1Success,
            AuditAction::AuthRateLimited,
            AuditAction::ApplicationRejected,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()).unwrap(), action);
        }
        assert!(AuditAction::parse("auth_step3_success").is_err());
    }

    #[tokio::test]
    async fn test_append_links_entries() {
        let (_pool, log) = audit_log().await;

        log.append(
            AuditEvent::new(AuditAction::AuthStep1Failed, "admin_auth")
                .details(json!({"step": "step1"}))
                .source("10.0.0.1", Some("curl/8")),
        )
        .await
        .unwrap();
        log.append(AuditEvent::new(AuditAction::AuthStep1Success, "admin_auth"))
            .await
            .unwrap();

        let entries = log.recent(None, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].prev_hash, GENESIS_HASH);
        assert_eq!(entries[0].prev_hash, entries[1].entry_hash);
        assert_eq!(entries[1].ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(entries[1].details["step"], "step1");

        let failed = log
            .recent(Some(AuditAction::AuthStep1Failed), 10)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);

        let verification = log.verify_chain().await.unwrap();
        assert!(verification.chain_intact);
        assert_eq!(verification.total_entries, 2);
    }

    #[tokio::test]
    async fn test_rows_cannot_be_updated_or_deleted() {
        let (pool, log) = audit_log().await;
        log.append(AuditEvent::new(AuditAction::AuthRateLimited, "admin_auth"))
            .await
            .unwrap();

        assert!(sqlx::query("UPDATE audit_logs SET ip_address = 'x'")
            .execute(&pool)
            .await
            .is_err());
        assert!(sqlx::query("DELETE FROM audit_logs")
            .execute(&pool)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_verify_detects_tampering() {
        let (pool, log) = audit_log().await;
        for _ in 0..3 {
            log.append(
                AuditEvent::new(AuditAction::AuthStep2Failed, "admin_auth")
                    .details(json!({"step": "step2"})),
            )
            .await
            .unwrap();
        }

        // Simulate out-of-band tampering that bypasses the guard triggers
        sqlx::query("DROP TRIGGER audit_logs_no_update")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE audit_logs SET action = 'auth_step2_success' WHERE id = 2")
            .execute(&pool)
            .await
            .unwrap();

        let verification = log.verify_chain().await.unwrap();
        assert!(!verification.chain_intact);
        assert_eq!(verification.first_break_at, Some(2));
    }
}
