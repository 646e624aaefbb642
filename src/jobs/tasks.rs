/// Background task implementations
use crate::{
    audit::ChainVerification,
    context::AppContext,
    error::GateResult,
    metrics,
};
use chrono::Duration;

/// Delete expired admin sessions
pub async fn purge_expired_sessions(ctx: &AppContext) -> GateResult<u64> {
    ctx.sessions.purge_expired().await
}

/// Delete attempt rows older than the retention period
pub async fn purge_old_attempts(ctx: &AppContext) -> GateResult<u64> {
    let retention = Duration::seconds(ctx.config.housekeeping.attempt_retention_secs);
    ctx.throttle.purge_older_than(retention).await
}

/// Delete expired or revoked bearer credentials
pub async fn purge_expired_credentials(ctx: &AppContext) -> GateResult<u64> {
    ctx.tokens.purge_expired().await
}

/// Run every purge once, returning the total rows removed
pub async fn run_housekeeping(ctx: &AppContext) -> GateResult<u64> {
    let removed = purge_expired_sessions(ctx).await?
        + purge_old_attempts(ctx).await?
        + purge_expired_credentials(ctx).await?;

    metrics::HOUSEKEEPING_LAST_PURGED.set(removed as i64);

    Ok(removed)
}

/// Walk the audit hash chain
pub async fn verify_audit_chain(ctx: &AppContext) -> GateResult<ChainVerification> {
    ctx.audit.verify_chain().await
}

/// Health check - verify the database is reachable
pub async fn health_check(ctx: &AppContext) -> GateResult<()> {
    crate::db::test_connection(&ctx.db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_gate::{RequestSource, Step};
    use crate::clock::ManualClock;
    use crate::config::GateConfig;
    use crate::db::memory_pool;
    use chrono::Utc;
    use std::sync::Arc;

    async fn context(clock: &ManualClock) -> AppContext {
        let mut config = GateConfig::for_tests();
        config.housekeeping.attempt_retention_secs = 3600;
        AppContext::with_pool(config, memory_pool().await, Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_housekeeping_removes_only_stale_rows() {
        let clock = ManualClock::new(Utc::now());
        let ctx = context(&clock).await;

        ctx.sessions.create_step1_session("10.0.0.1").await.unwrap();
        ctx.throttle.record("10.0.0.1", Step::Step1, false).await.unwrap();
        ctx.tokens.issue("user-1", Duration::minutes(10)).await.unwrap();

        assert_eq!(run_housekeeping(&ctx).await.unwrap(), 0);

        clock.advance(Duration::hours(2));
        ctx.sessions.create_step1_session("10.0.0.2").await.unwrap();
        ctx.throttle.record("10.0.0.2", Step::Step1, true).await.unwrap();

        assert_eq!(run_housekeeping(&ctx).await.unwrap(), 3);
        assert_eq!(
            ctx.throttle
                .count_recent("10.0.0.2", Step::Step1, Duration::hours(1))
                .await
                .unwrap(),
            1
        );
        health_check(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_audit_chain_after_sign_in_attempts() {
        let clock = ManualClock::new(Utc::now());
        let ctx = context(&clock).await;
        let source = RequestSource::new("10.0.0.1", None);

        // No secrets provisioned: step 1 fails closed before any attempt is recorded
        assert!(ctx.two_step.step1(&source, "anything").await.is_err());
        assert!(ctx.two_step.step2(&source, Some("bogus"), "x").await.is_err());

        let verification = verify_audit_chain(&ctx).await.unwrap();
        assert!(verification.chain_intact);
        assert_eq!(verification.total_entries, 1);
    }
}
