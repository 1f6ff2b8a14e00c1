use std::collections::HashSet;

use crate::error::CoreResult;
use crate::types::{
    Acknowledgement, Department, NewAcknowledgement, NewPolicy, NewPolicyVersion, NewUser, Policy,
    PolicyFilter, PolicyUpdate, PolicyVersion, Stats, User, UserUpdate,
};

// ---------------------------------------------------------------------------
// DocumentStore — persistence for every PolicyFlow row
//
// Single-writer: implementations serialize all writes. Multi-statement
// operations (`create_version`) must be atomic to readers. Lookups of a
// missing row return NotFound; uniqueness violations return Conflict; every
// other failure is Internal.
// ---------------------------------------------------------------------------

pub trait DocumentStore: Send + Sync {
    // Departments
    fn create_department(&self, name: &str, description: &str) -> CoreResult<Department>;
    fn get_department(&self, id: &str) -> CoreResult<Department>;
    fn list_departments(&self) -> CoreResult<Vec<Department>>;
    fn update_department(&self, id: &str, name: &str, description: &str)
        -> CoreResult<Department>;
    fn delete_department(&self, id: &str) -> CoreResult<()>;
    fn department_has_policies(&self, id: &str) -> CoreResult<bool>;

    // Users
    fn create_user(&self, user: &NewUser) -> CoreResult<User>;
    fn get_user(&self, id: &str) -> CoreResult<User>;
    fn get_user_by_email(&self, email: &str) -> CoreResult<User>;
    /// All users, or only those of one department, oldest first.
    fn list_users(&self, department_id: Option<&str>) -> CoreResult<Vec<User>>;
    /// Refuses, with Conflict, to demote the last SuperAdmin. The check and
    /// the write share one transaction.
    fn update_user(&self, id: &str, update: &UserUpdate) -> CoreResult<User>;
    /// Removes the user together with their acknowledgements. Refuses, with
    /// Conflict, to delete the last SuperAdmin.
    fn delete_user(&self, id: &str) -> CoreResult<()>;
    fn count_super_admins(&self) -> CoreResult<u64>;

    // Policies
    fn create_policy(&self, policy: &NewPolicy) -> CoreResult<Policy>;
    fn get_policy(&self, id: &str) -> CoreResult<Policy>;
    /// Newest first.
    fn list_policies(&self, filter: &PolicyFilter) -> CoreResult<Vec<Policy>>;
    fn update_policy(&self, id: &str, update: &PolicyUpdate) -> CoreResult<Policy>;

    // Versions
    /// Insert an immutable version and repoint the policy's current version
    /// to it in one atomic step.
    fn create_version(&self, policy_id: &str, version: &NewPolicyVersion)
        -> CoreResult<PolicyVersion>;
    fn set_current_version(&self, policy_id: &str, version_id: &str) -> CoreResult<()>;
    fn get_version(&self, id: &str) -> CoreResult<PolicyVersion>;
    /// Newest first.
    fn list_versions(&self, policy_id: &str) -> CoreResult<Vec<PolicyVersion>>;

    // Acknowledgements
    fn create_acknowledgement(&self, ack: &NewAcknowledgement) -> CoreResult<Acknowledgement>;
    fn has_acknowledged(&self, user_id: &str, policy_version_id: &str) -> CoreResult<bool>;
    /// Every version id the user has acknowledged.
    fn acknowledged_versions(&self, user_id: &str) -> CoreResult<HashSet<String>>;
    /// Newest first.
    fn list_acknowledgements(&self, policy_version_id: &str) -> CoreResult<Vec<Acknowledgement>>;

    fn stats(&self) -> CoreResult<Stats>;
}
