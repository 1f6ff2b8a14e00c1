//! Authorization guard.
//!
//! Stateless checks over (caller, target, requested change). Each function
//! first admits the caller through the rule table, then applies the
//! target-level check, then rewrites the change-set so that a department
//! admin can never widen a policy's audience or mint a SuperAdmin. Clamped
//! fields succeed silently; only reaching outside one's own department is
//! rejected.

use policyflow_core::{
    CallerContext, CoreError, CoreResult, Policy, PolicyInput, PolicyPatch, Role, User, UserInput,
    UserPatch, VisibilityType,
};
use tracing::{debug, warn};

use crate::rule::{admit, Operation, Scope};

fn own_department(caller: &CallerContext) -> CoreResult<String> {
    caller
        .department()
        .map(str::to_string)
        .ok_or_else(|| CoreError::forbidden("department admin must belong to a department"))
}

fn outside_department(caller: &CallerContext, op: Operation, target_id: &str) -> CoreError {
    warn!(
        user_id = %caller.user_id,
        op = %op,
        target = target_id,
        "target outside caller's department"
    );
    CoreError::forbidden(format!(
        "{} is outside your department",
        match op {
            Operation::CreateUser | Operation::UpdateUser => "user",
            _ => "policy",
        }
    ))
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Admit a policy creation. A department admin's policy is always scoped to
/// their own department, whatever the request said.
pub fn authorize_create_policy(
    caller: &CallerContext,
    mut input: PolicyInput,
) -> CoreResult<PolicyInput> {
    if admit(caller, Operation::CreatePolicy)? == Scope::OwnDepartment {
        let dept = own_department(caller)?;
        if input.visibility_type.as_deref() != Some(VisibilityType::Department.as_str())
            || input.department_id.as_deref() != Some(dept.as_str())
        {
            debug!(user_id = %caller.user_id, "clamping new policy to caller's department");
        }
        input.visibility_type = Some(VisibilityType::Department.as_str().to_string());
        input.department_id = Some(dept);
    }
    Ok(input)
}

/// Admit a policy update. A department admin may only touch policies scoped
/// to their own department, and the outgoing change-set is pinned there.
pub fn authorize_update_policy(
    caller: &CallerContext,
    target: &Policy,
    mut patch: PolicyPatch,
) -> CoreResult<PolicyPatch> {
    if admit(caller, Operation::UpdatePolicy)? == Scope::OwnDepartment {
        let dept = own_department(caller)?;
        if !target.is_department_scoped_to(&dept) {
            return Err(outside_department(caller, Operation::UpdatePolicy, &target.id));
        }
        patch.visibility_type = Some(VisibilityType::Department.as_str().to_string());
        patch.department_id = Some(dept);
    }
    Ok(patch)
}

/// Admit a new version (or a current-version switch) on `target`.
pub fn authorize_create_version(caller: &CallerContext, target: &Policy) -> CoreResult<()> {
    authorize_policy_target(caller, target, Operation::CreatePolicyVersion)
}

/// Admit reading the acknowledgement roster of `target`.
pub fn authorize_list_acknowledgements(caller: &CallerContext, target: &Policy) -> CoreResult<()> {
    authorize_policy_target(caller, target, Operation::ListAcknowledgements)
}

fn authorize_policy_target(
    caller: &CallerContext,
    target: &Policy,
    op: Operation,
) -> CoreResult<()> {
    if admit(caller, op)? == Scope::OwnDepartment {
        let dept = own_department(caller)?;
        if !target.is_department_scoped_to(&dept) {
            return Err(outside_department(caller, op, &target.id));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Admit a user listing. Returns the department to restrict the listing to,
/// or `None` for every user.
pub fn authorize_list_users(caller: &CallerContext) -> CoreResult<Option<String>> {
    match admit(caller, Operation::ListUsers)? {
        Scope::OwnDepartment => Ok(Some(own_department(caller)?)),
        _ => Ok(None),
    }
}

/// Admit a user creation. A department admin always creates into their own
/// department, and a requested SuperAdmin role is lowered to Staff.
pub fn authorize_create_user(caller: &CallerContext, mut input: UserInput) -> CoreResult<UserInput> {
    if admit(caller, Operation::CreateUser)? == Scope::OwnDepartment {
        input.department_id = Some(own_department(caller)?);
        if input.role.as_deref() == Some(Role::SuperAdmin.as_str()) {
            debug!(user_id = %caller.user_id, "clamping requested SuperAdmin role to Staff");
            input.role = Some(Role::Staff.as_str().to_string());
        }
    }
    Ok(input)
}

/// Admit a user update. A department admin may only edit non-SuperAdmin
/// users of their own department; the department stays theirs and a
/// requested SuperAdmin role falls back to the target's current role.
pub fn authorize_update_user(
    caller: &CallerContext,
    target: &User,
    mut patch: UserPatch,
) -> CoreResult<UserPatch> {
    if admit(caller, Operation::UpdateUser)? == Scope::OwnDepartment {
        let dept = own_department(caller)?;
        if target.department_id.as_deref() != Some(dept.as_str()) || target.role == Role::SuperAdmin
        {
            return Err(outside_department(caller, Operation::UpdateUser, &target.id));
        }
        patch.department_id = Some(dept);
        if patch.role.as_deref() == Some(Role::SuperAdmin.as_str()) {
            debug!(user_id = %caller.user_id, target = %target.id, "keeping target's role");
            patch.role = Some(target.role.as_str().to_string());
        }
    }
    Ok(patch)
}

/// Admit a user deletion. Nobody may delete themselves.
pub fn authorize_delete_user(caller: &CallerContext, target: &User) -> CoreResult<()> {
    admit(caller, Operation::DeleteUser)?;
    if caller.user_id == target.id {
        return Err(CoreError::conflict("cannot delete yourself"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Departments
// ---------------------------------------------------------------------------

pub fn authorize_department_change(caller: &CallerContext, op: Operation) -> CoreResult<()> {
    debug_assert!(matches!(
        op,
        Operation::CreateDepartment | Operation::UpdateDepartment | Operation::DeleteDepartment
    ));
    admit(caller, op).map(|_| ())
}
