//! PolicyFlow access layer
//!
//! Everything between a resolved caller and the document store:
//! - Role/operation admission table with department scoping
//! - Guard sanitizers that clamp department admins to their own department
//! - Visibility resolution (organization-wide plus own department)
//! - Policy lifecycle: drafts, immutable versions, publication, signed
//!   acknowledgements
//! - User and department directory, admin statistics

pub mod directory;
pub mod engine;
pub mod guard;
pub mod rule;
pub mod stats;
pub mod visibility;

pub use directory::Directory;
pub use engine::PolicyEngine;
pub use rule::{admit, rule_for, Operation, Scope};
pub use stats::stats_report;
pub use visibility::{can_view, filter_for, get_visible_policy, list_visible_policies};
