/// Privilege Gate
///
/// Decides whether a resolved caller may perform an operation that requires a
/// role. A denial is always reported before any side effect takes place.

use super::roles::{Role, RoleManager};
use crate::account::CallerIdentity;
use crate::error::{GateError, GateResult};
use crate::metrics::GATE_DECISIONS_TOTAL;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessDecision {
    fn as_str(&self) -> &'static str {
        match self {
            AccessDecision::Allow => "allow",
            AccessDecision::Deny => "deny",
        }
    }
}

pub struct PrivilegeGate {
    roles: Arc<RoleManager>,
}

impl PrivilegeGate {
    pub fn new(roles: Arc<RoleManager>) -> Self {
        Self { roles }
    }

    pub async fn authorize(
        &self,
        caller: &CallerIdentity,
        required: Role,
    ) -> GateResult<AccessDecision> {
        let decision = if self.roles.has_role(&caller.user_id, required).await? {
            AccessDecision::Allow
        } else {
            AccessDecision::Deny
        };

        GATE_DECISIONS_TOTAL
            .with_label_values(&[required.as_str(), decision.as_str()])
            .inc();

        if decision == AccessDecision::Deny {
            tracing::warn!("Denied {} access to {}", required, caller.user_id);
        }

        Ok(decision)
    }

    /// `authorize`, with `Deny` mapped to `Forbidden`
    pub async fn require(&self, caller: &CallerIdentity, required: Role) -> GateResult<()> {
        match self.authorize(caller, required).await? {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny => Err(GateError::Forbidden(format!(
                "{} role required",
                required
            ))),
        }
    }
}
