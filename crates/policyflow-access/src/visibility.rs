//! Visibility resolution: which policies a caller may see.
//!
//! A SuperAdmin sees everything. Anyone else sees organization-wide
//! policies plus those scoped to their own department. A policy outside a
//! caller's view is reported as not found so its existence never leaks.

use policyflow_core::{
    CallerContext, CoreError, CoreResult, DocumentStore, Policy, PolicyFilter, Role,
    VisibilityType,
};
use tracing::debug;

/// The store filter matching the caller's view.
pub fn filter_for(caller: &CallerContext) -> PolicyFilter {
    match (caller.role, caller.department()) {
        (Role::SuperAdmin, _) => PolicyFilter::All,
        (_, Some(dept)) => PolicyFilter::OrganizationAndDepartment(dept.to_string()),
        (_, None) => PolicyFilter::OrganizationOnly,
    }
}

pub fn can_view(caller: &CallerContext, policy: &Policy) -> bool {
    match caller.role {
        Role::SuperAdmin => true,
        _ => match policy.visibility_type {
            VisibilityType::Organization => true,
            VisibilityType::Department => match caller.department() {
                Some(dept) => policy.department_id.as_deref() == Some(dept),
                None => false,
            },
        },
    }
}

/// Every policy visible to the caller, newest first.
pub fn list_visible_policies(
    store: &dyn DocumentStore,
    caller: &CallerContext,
) -> CoreResult<Vec<Policy>> {
    let filter = filter_for(caller);
    debug!(user_id = %caller.user_id, ?filter, "listing visible policies");
    store.list_policies(&filter)
}

/// Load one policy, hiding it behind NotFound when the caller cannot see it.
pub fn get_visible_policy(
    store: &dyn DocumentStore,
    caller: &CallerContext,
    policy_id: &str,
) -> CoreResult<Policy> {
    let policy = store.get_policy(policy_id)?;
    if !can_view(caller, &policy) {
        debug!(user_id = %caller.user_id, policy_id, "policy hidden from caller");
        return Err(CoreError::not_found("policy not found"));
    }
    Ok(policy)
}
