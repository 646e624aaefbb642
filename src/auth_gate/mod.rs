/// Two-step admin authentication
///
/// A passphrase challenge in two sequential steps. Step 1 opens a short-lived
/// session; step 2, presented with that session's token, upgrades it to a
/// fully authenticated admin session. Both steps are throttled per source IP
/// and audited.

pub mod protocol;
pub mod secrets;
pub mod session;
pub mod throttle;

pub use protocol::{AuthOutcome, RequestSource, SessionStatus, TwoStepAuth};
pub use secrets::{PassphraseVerifier, SecretStore};
pub use session::SessionStore;
pub use throttle::AttemptThrottle;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Challenge step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Step1,
    Step2,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Step1 => "step1",
            Step::Step2 => "step2",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an admin session
///
/// A step 1 submission is pending only while its request is in flight; no
/// stored session is ever in that state, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Unauthenticated,
    Step1Verified,
    FullyAuthenticated,
}
