use std::fmt;

use policyflow_core::{CallerContext, CoreError, CoreResult, Role};
use tracing::warn;

/// Every guarded operation the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ReadPolicies,
    Acknowledge,
    ListDepartments,
    CreatePolicy,
    UpdatePolicy,
    CreatePolicyVersion,
    ListAcknowledgements,
    ListUsers,
    CreateUser,
    UpdateUser,
    DeleteUser,
    CreateDepartment,
    UpdateDepartment,
    DeleteDepartment,
    ViewStats,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::ReadPolicies,
        Operation::Acknowledge,
        Operation::ListDepartments,
        Operation::CreatePolicy,
        Operation::UpdatePolicy,
        Operation::CreatePolicyVersion,
        Operation::ListAcknowledgements,
        Operation::ListUsers,
        Operation::CreateUser,
        Operation::UpdateUser,
        Operation::DeleteUser,
        Operation::CreateDepartment,
        Operation::UpdateDepartment,
        Operation::DeleteDepartment,
        Operation::ViewStats,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::ReadPolicies => "read_policies",
            Operation::Acknowledge => "acknowledge",
            Operation::ListDepartments => "list_departments",
            Operation::CreatePolicy => "create_policy",
            Operation::UpdatePolicy => "update_policy",
            Operation::CreatePolicyVersion => "create_policy_version",
            Operation::ListAcknowledgements => "list_acknowledgements",
            Operation::ListUsers => "list_users",
            Operation::CreateUser => "create_user",
            Operation::UpdateUser => "update_user",
            Operation::DeleteUser => "delete_user",
            Operation::CreateDepartment => "create_department",
            Operation::UpdateDepartment => "update_department",
            Operation::DeleteDepartment => "delete_department",
            Operation::ViewStats => "view_stats",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a role's reach extends for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Unrestricted,
    /// Only targets inside the caller's own department.
    OwnDepartment,
    Denied,
}

/// The role/operation admission matrix.
///
/// Exhaustive over both enums: adding a role or an operation fails to
/// compile until this table says what it may do.
pub fn rule_for(op: Operation, role: Role) -> Scope {
    use Operation::*;
    use Scope::*;

    match (op, role) {
        (ReadPolicies | Acknowledge | ListDepartments, _) => Unrestricted,

        (CreatePolicy | UpdatePolicy | CreatePolicyVersion | ListAcknowledgements, role) => {
            match role {
                Role::SuperAdmin => Unrestricted,
                Role::DeptAdmin => OwnDepartment,
                Role::Staff => Denied,
            }
        }

        (ListUsers | CreateUser | UpdateUser, role) => match role {
            Role::SuperAdmin => Unrestricted,
            Role::DeptAdmin => OwnDepartment,
            Role::Staff => Denied,
        },

        (DeleteUser | CreateDepartment | UpdateDepartment | DeleteDepartment, role) => match role {
            Role::SuperAdmin => Unrestricted,
            Role::DeptAdmin | Role::Staff => Denied,
        },

        (ViewStats, role) => match role {
            Role::SuperAdmin | Role::DeptAdmin => Unrestricted,
            Role::Staff => Denied,
        },
    }
}

/// Admit the caller to an operation, returning the scope they hold.
///
/// `Denied` becomes Forbidden. `OwnDepartment` also requires the caller to
/// belong to a department; a department-less DeptAdmin is Forbidden.
pub fn admit(caller: &CallerContext, op: Operation) -> CoreResult<Scope> {
    match rule_for(op, caller.role) {
        Scope::Denied => {
            warn!(user_id = %caller.user_id, role = %caller.role, op = %op, "operation denied by role");
            Err(CoreError::forbidden(format!(
                "{} may not {}",
                caller.role,
                op.as_str().replace('_', " ")
            )))
        }
        Scope::OwnDepartment if caller.department().is_none() => {
            warn!(user_id = %caller.user_id, op = %op, "department-scoped caller has no department");
            Err(CoreError::forbidden(
                "department admin must belong to a department",
            ))
        }
        scope => Ok(scope),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyflow_core::ErrorKind;

    fn caller(role: Role, dept: Option<&str>) -> CallerContext {
        CallerContext::new("u1", role, dept.map(str::to_string))
    }

    #[test]
    fn test_every_role_reads_and_acknowledges() {
        for role in [Role::SuperAdmin, Role::DeptAdmin, Role::Staff] {
            for op in [
                Operation::ReadPolicies,
                Operation::Acknowledge,
                Operation::ListDepartments,
            ] {
                assert_eq!(rule_for(op, role), Scope::Unrestricted, "{} {}", role, op);
            }
        }
    }

    #[test]
    fn test_staff_denied_every_mutation() {
        for op in Operation::ALL {
            let scope = rule_for(op, Role::Staff);
            match op {
                Operation::ReadPolicies | Operation::Acknowledge | Operation::ListDepartments => {
                    assert_eq!(scope, Scope::Unrestricted)
                }
                _ => assert_eq!(scope, Scope::Denied, "staff should be denied {}", op),
            }
        }
    }

    #[test]
    fn test_super_admin_unrestricted_everywhere() {
        for op in Operation::ALL {
            assert_eq!(rule_for(op, Role::SuperAdmin), Scope::Unrestricted);
        }
    }

    #[test]
    fn test_dept_admin_matrix() {
        assert_eq!(
            rule_for(Operation::CreatePolicy, Role::DeptAdmin),
            Scope::OwnDepartment
        );
        assert_eq!(
            rule_for(Operation::CreateUser, Role::DeptAdmin),
            Scope::OwnDepartment
        );
        assert_eq!(rule_for(Operation::DeleteUser, Role::DeptAdmin), Scope::Denied);
        assert_eq!(
            rule_for(Operation::DeleteDepartment, Role::DeptAdmin),
            Scope::Denied
        );
        assert_eq!(
            rule_for(Operation::ViewStats, Role::DeptAdmin),
            Scope::Unrestricted
        );
    }

    #[test]
    fn test_admit_denied_is_forbidden() {
        let err = admit(&caller(Role::Staff, Some("d1")), Operation::CreatePolicy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(err.message().contains("create policy"));
    }

    #[test]
    fn test_admit_own_department_requires_department() {
        let err = admit(&caller(Role::DeptAdmin, None), Operation::UpdatePolicy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let scope = admit(&caller(Role::DeptAdmin, Some("d1")), Operation::UpdatePolicy).unwrap();
        assert_eq!(scope, Scope::OwnDepartment);
    }

    #[test]
    fn test_admit_unrestricted_ignores_department() {
        let scope = admit(&caller(Role::SuperAdmin, None), Operation::CreateUser).unwrap();
        assert_eq!(scope, Scope::Unrestricted);
        let scope = admit(&caller(Role::Staff, None), Operation::Acknowledge).unwrap();
        assert_eq!(scope, Scope::Unrestricted);
    }
}
