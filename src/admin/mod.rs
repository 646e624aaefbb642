/// Administration
///
/// Role management, the privilege gate guarding admin operations, and the
/// seller application review they protect.

pub mod applications;
pub mod gate;
pub mod roles;
pub mod slug;

pub use applications::{
    ApplicationDetails, ApplicationManager, ApplicationStatus, DashboardStats, ReviewAction,
    ReviewRequest, SellerApplication,
};
pub use gate::PrivilegeGate;
pub use roles::{Role, RoleManager};
