use policyflow_core::{
    CallerContext, CoreError, CoreResult, Department, DepartmentInput, DepartmentPatch,
    DocumentStore, ErrorKind, NewUser, Role, User, UserInput, UserPatch, UserUpdate,
};
use tracing::{debug, info};

use crate::engine::non_empty;
use crate::guard;
use crate::rule::{admit, Operation};

// ---------------------------------------------------------------------------
// Directory — users and departments
// ---------------------------------------------------------------------------

pub struct Directory<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> Directory<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// The caller's own user row.
    pub fn me(&self, caller: &CallerContext) -> CoreResult<User> {
        self.store.get_user(&caller.user_id)
    }

    // -- departments -------------------------------------------------------

    /// All departments, by name.
    pub fn list_departments(&self, caller: &CallerContext) -> CoreResult<Vec<Department>> {
        admit(caller, Operation::ListDepartments)?;
        self.store.list_departments()
    }

    pub fn create_department(
        &self,
        caller: &CallerContext,
        input: DepartmentInput,
    ) -> CoreResult<Department> {
        guard::authorize_department_change(caller, Operation::CreateDepartment)?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid("name is required"));
        }
        let dept = self
            .store
            .create_department(name, input.description.trim())?;
        info!(user_id = %caller.user_id, department_id = %dept.id, name = %dept.name, "department created");
        Ok(dept)
    }

    /// Blank or absent fields keep their stored value.
    pub fn update_department(
        &self,
        caller: &CallerContext,
        id: &str,
        patch: DepartmentPatch,
    ) -> CoreResult<Department> {
        guard::authorize_department_change(caller, Operation::UpdateDepartment)?;
        let existing = self.store.get_department(id)?;
        let name = non_empty(patch.name).unwrap_or(existing.name);
        let description = non_empty(patch.description).unwrap_or(existing.description);
        let dept = self.store.update_department(id, &name, &description)?;
        info!(user_id = %caller.user_id, department_id = %dept.id, "department updated");
        Ok(dept)
    }

    /// Refused while any policy is scoped to the department. Members are
    /// left without a department.
    pub fn delete_department(&self, caller: &CallerContext, id: &str) -> CoreResult<()> {
        guard::authorize_department_change(caller, Operation::DeleteDepartment)?;
        self.store.get_department(id)?;
        if self.store.department_has_policies(id)? {
            return Err(CoreError::conflict(
                "department has assigned policies; reassign them first",
            ));
        }
        self.store.delete_department(id)?;
        info!(user_id = %caller.user_id, department_id = id, "department deleted");
        Ok(())
    }

    // -- users -------------------------------------------------------------

    pub fn list_users(&self, caller: &CallerContext) -> CoreResult<Vec<User>> {
        let scope = guard::authorize_list_users(caller)?;
        debug!(user_id = %caller.user_id, department = ?scope, "listing users");
        self.store.list_users(scope.as_deref())
    }

    pub fn create_user(&self, caller: &CallerContext, input: UserInput) -> CoreResult<User> {
        let input = guard::authorize_create_user(caller, input)?;

        let email = input.email.trim();
        let name = input.name.trim();
        if email.is_empty() || name.is_empty() {
            return Err(CoreError::invalid("email and name are required"));
        }
        let role = match non_empty(input.role) {
            Some(r) => r.parse::<Role>()?,
            None => Role::Staff,
        };
        let department_id = self.check_department(non_empty(input.department_id))?;

        let user = self.store.create_user(&NewUser {
            email: email.to_string(),
            name: name.to_string(),
            role,
            department_id,
            created_by: Some(caller.user_id.clone()),
        })?;
        info!(
            user_id = %caller.user_id,
            created = %user.id,
            role = %user.role,
            "user created"
        );
        Ok(user)
    }

    /// Absent fields keep their stored value; an empty `department_id`
    /// removes the user from their department.
    pub fn update_user(
        &self,
        caller: &CallerContext,
        id: &str,
        patch: UserPatch,
    ) -> CoreResult<User> {
        let target = self.store.get_user(id)?;
        let patch = guard::authorize_update_user(caller, &target, patch)?;

        let name = non_empty(patch.name).unwrap_or_else(|| target.name.clone());
        let email = non_empty(patch.email).unwrap_or_else(|| target.email.clone());
        let role = match non_empty(patch.role) {
            Some(r) => r.parse::<Role>()?,
            None => target.role,
        };
        let department_id = match patch.department_id {
            None => target.department_id.clone(),
            Some(d) => self.check_department(non_empty(Some(d)))?,
        };

        let updated = self.store.update_user(
            &target.id,
            &UserUpdate {
                name,
                email,
                role,
                department_id,
            },
        )?;
        info!(user_id = %caller.user_id, target = %updated.id, role = %updated.role, "user updated");
        Ok(updated)
    }

    pub fn delete_user(&self, caller: &CallerContext, id: &str) -> CoreResult<()> {
        admit(caller, Operation::DeleteUser)?;
        let target = self.store.get_user(id)?;
        guard::authorize_delete_user(caller, &target)?;
        self.store.delete_user(&target.id)?;
        info!(user_id = %caller.user_id, target = %target.id, "user deleted");
        Ok(())
    }

    fn check_department(&self, department_id: Option<String>) -> CoreResult<Option<String>> {
        match department_id {
            None => Ok(None),
            Some(dept) => match self.store.get_department(&dept) {
                Ok(_) => Ok(Some(dept)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(CoreError::invalid(format!("unknown department {}", dept)))
                }
                Err(e) => Err(e),
            },
        }
    }
}
