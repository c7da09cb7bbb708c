pub mod admin;
pub mod checkout;
pub mod reconciler;
pub mod roles;
pub mod stage_actions;
pub mod stats;

pub use admin::AdminService;
pub use checkout::{CheckoutResult, CheckoutSequencer};
pub use reconciler::{LedgerReconciler, ProductFilter};
pub use roles::{
    RoleAssignment, RoleDirectory, RoleError, RoleOverride, RoleOverrideStore, RoleSource,
};
pub use stage_actions::{ActionError, CollectForm, StageActions};
pub use stats::ActivityStats;
