/// Role Management
use crate::clock::{to_millis, SharedClock};
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteExecutor, SqlitePool};
use std::fmt;

/// Capabilities a user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May review seller applications and read the dashboard
    Admin,
    /// Operates a store
    Seller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Seller => "seller",
        }
    }

    pub fn parse(s: &str) -> GateResult<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "seller" => Ok(Role::Seller),
            _ => Err(GateError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role manager
pub struct RoleManager {
    db: SqlitePool,
    clock: SharedClock,
}

impl RoleManager {
    pub fn new(db: SqlitePool, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Grant a role. Returns false if the user already held it.
    pub async fn grant_role(&self, user_id: &str, role: Role) -> GateResult<bool> {
        grant_with(&self.db, user_id, role, to_millis(self.clock.now())).await
    }

    /// Whether the user holds a role
    pub async fn has_role(&self, user_id: &str, role: Role) -> GateResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_roles WHERE user_id = ? AND role = ?")
                .bind(user_id)
                .bind(role.as_str())
                .fetch_one(&self.db)
                .await?;

        Ok(count > 0)
    }

    /// All roles a user holds
    pub async fn roles_for(&self, user_id: &str) -> GateResult<Vec<Role>> {
        let rows = sqlx::query("SELECT role FROM user_roles WHERE user_id = ? ORDER BY id ASC")
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;

        rows.iter()
            .map(|row| {
                let role: String = row.try_get("role")?;
                Role::parse(&role)
            })
            .collect()
    }

    /// Revoke a role
    pub async fn revoke_role(&self, user_id: &str, role: Role) -> GateResult<()> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role = ?")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GateError::NotFound(format!(
                "User {} does not hold role {}",
                user_id, role
            )));
        }

        tracing::info!("Revoked role {} from {}", role, user_id);
        Ok(())
    }
}

/// Idempotent role insert on any executor, so it can join a transaction
pub(crate) async fn grant_with<'e, E>(
    executor: E,
    user_id: &str,
    role: Role,
    granted_at: i64,
) -> GateResult<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO user_roles (user_id, role, granted_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(role.as_str())
    .bind(granted_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
