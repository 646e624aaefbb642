/// Attempt throttle
///
/// Counts authentication attempts per (ip, step) inside a sliding window.
/// Check and record are separate statements, so concurrent requests can only
/// over-count.
use super::Step;
use crate::clock::{to_millis, SharedClock};
use crate::error::GateResult;
use chrono::Duration;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy)]
pub struct ThrottlePolicy {
    pub window: Duration,
    pub max_attempts: i64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            window: Duration::minutes(30),
            max_attempts: 5,
        }
    }
}

pub struct AttemptThrottle {
    db: SqlitePool,
    clock: SharedClock,
    policy: ThrottlePolicy,
}

impl AttemptThrottle {
    pub fn new(db: SqlitePool, clock: SharedClock, policy: ThrottlePolicy) -> Self {
        Self { db, clock, policy }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Record an attempt, successful or not
    pub async fn record(&self, ip: &str, step: Step, success: bool) -> GateResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_auth_attempts (ip_address, step, success, attempted_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(ip)
        .bind(step.as_str())
        .bind(success)
        .bind(to_millis(self.clock.now()))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Attempts for (ip, step) within `window` of now
    pub async fn count_recent(&self, ip: &str, step: Step, window: Duration) -> GateResult<i64> {
        let since = to_millis(self.clock.now() - window);

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM admin_auth_attempts
            WHERE ip_address = ? AND step = ? AND attempted_at >= ?
            "#,
        )
        .bind(ip)
        .bind(step.as_str())
        .bind(since)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// True when the pair has used up its attempts for the current window
    pub async fn is_limited(&self, ip: &str, step: Step) -> GateResult<bool> {
        let count = self.count_recent(ip, step, self.policy.window).await?;
        Ok(count >= self.policy.max_attempts)
    }

    /// Drop attempts older than `retention`
    pub async fn purge_older_than(&self, retention: Duration) -> GateResult<u64> {
        let cutoff = to_millis(self.clock.now() - retention);

        let result = sqlx::query("DELETE FROM admin_auth_attempts WHERE attempted_at < ?")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
