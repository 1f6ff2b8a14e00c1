use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Role — closed set of caller roles
// ---------------------------------------------------------------------------

/// Caller role. Every match site, including the access rule table, is
/// exhaustive over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    SuperAdmin,
    DeptAdmin,
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SuperAdmin",
            Role::DeptAdmin => "DeptAdmin",
            Role::Staff => "Staff",
        }
    }
}

/// At least one SuperAdmin must survive every demotion and deletion.
///
/// `current` is the target's stored role, `new_role` is `None` for a
/// deletion and `super_admin_count` includes the target.
pub fn ensure_super_admin_remains(
    current: Role,
    new_role: Option<Role>,
    super_admin_count: u64,
) -> Result<(), CoreError> {
    if current != Role::SuperAdmin || new_role == Some(Role::SuperAdmin) {
        return Ok(());
    }
    if super_admin_count <= 1 {
        return Err(CoreError::conflict(match new_role {
            Some(_) => "cannot downgrade the last super admin",
            None => "cannot delete the last super admin",
        }));
    }
    Ok(())
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SuperAdmin" => Ok(Role::SuperAdmin),
            "DeptAdmin" => Ok(Role::DeptAdmin),
            "Staff" => Ok(Role::Staff),
            other => Err(CoreError::invalid(format!("invalid role '{}'", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyStatus
// ---------------------------------------------------------------------------

/// Publication status of a policy. Any status may be set from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyStatus {
    Draft,
    Review,
    Published,
    Archived,
}

impl PolicyStatus {
    pub const ALL: [PolicyStatus; 4] = [
        PolicyStatus::Draft,
        PolicyStatus::Review,
        PolicyStatus::Published,
        PolicyStatus::Archived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyStatus::Draft => "Draft",
            PolicyStatus::Review => "Review",
            PolicyStatus::Published => "Published",
            PolicyStatus::Archived => "Archived",
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::invalid(format!("invalid status '{}'", s)))
    }
}

// ---------------------------------------------------------------------------
// VisibilityType
// ---------------------------------------------------------------------------

/// Whether a policy is visible to the whole organization or to one
/// department's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityType {
    Organization,
    Department,
}

impl VisibilityType {
    pub fn as_str(self) -> &'static str {
        match self {
            VisibilityType::Organization => "organization",
            VisibilityType::Department => "department",
        }
    }
}

impl fmt::Display for VisibilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisibilityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization" => Ok(VisibilityType::Organization),
            "department" => Ok(VisibilityType::Department),
            other => Err(CoreError::invalid(format!(
                "invalid visibility_type '{}'",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// CallerContext — resolved identity threaded through every guarded call
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: String,
    pub role: Role,
    pub department_id: Option<String>,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>, role: Role, department_id: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            department_id,
        }
    }

    pub fn department(&self) -> Option<&str> {
        self.department_id.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Persisted rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub department_id: Option<String>,
    /// Resolved from `department_id` at read time.
    pub department_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub title: String,
    pub status: PolicyStatus,
    pub visibility_type: VisibilityType,
    pub department_id: Option<String>,
    /// Resolved from `department_id` at read time.
    pub department_name: Option<String>,
    pub current_version_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// The scope invariant: organization-wide policies carry no department,
    /// department-scoped policies always carry one.
    pub fn scope_is_consistent(&self) -> bool {
        match self.visibility_type {
            VisibilityType::Organization => self.department_id.is_none(),
            VisibilityType::Department => self.department_id.is_some(),
        }
    }

    pub fn is_department_scoped_to(&self, department_id: &str) -> bool {
        self.visibility_type == VisibilityType::Department
            && self.department_id.as_deref() == Some(department_id)
    }
}

/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub id: String,
    pub policy_id: String,
    pub content: String,
    pub version_string: String,
    pub changelog: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub id: String,
    pub user_id: String,
    pub policy_version_id: String,
    pub timestamp: DateTime<Utc>,
    pub signature_hash: String,
}

// ---------------------------------------------------------------------------
// Store-level write models (already validated and sanitized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub title: String,
    pub visibility_type: VisibilityType,
    pub department_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PolicyUpdate {
    pub title: String,
    pub status: PolicyStatus,
    pub visibility_type: VisibilityType,
    pub department_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPolicyVersion {
    pub content: String,
    pub version_string: String,
    pub changelog: String,
}

#[derive(Debug, Clone)]
pub struct NewAcknowledgement {
    pub user_id: String,
    pub policy_version_id: String,
    pub timestamp: DateTime<Utc>,
    pub signature_hash: String,
}

/// Row filter the visibility resolver hands to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyFilter {
    All,
    OrganizationOnly,
    OrganizationAndDepartment(String),
}

// ---------------------------------------------------------------------------
// Client-supplied change-sets
//
// Enumerated fields stay as raw strings so the engine can reject unknown
// values with InvalidArgument. The guard rewrites these before the engine
// sees them.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub visibility_type: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
}

/// Absent or empty fields keep the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub visibility_type: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInput {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub version_string: String,
    #[serde(default)]
    pub changelog: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
}

/// Absent fields keep the stored value; `department_id: ""` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyListItem {
    #[serde(flatten)]
    pub policy: Policy,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDetail {
    pub policy: Policy,
    pub current_version: Option<PolicyVersion>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_users: u64,
    pub total_policies: u64,
    pub draft_count: u64,
    pub review_count: u64,
    pub published_count: u64,
    pub archived_count: u64,
    #[serde(rename = "total_acknowledgements")]
    pub total_ack_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAckCount {
    pub policy_id: String,
    pub title: String,
    pub ack_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub stats: Stats,
    pub ack_counts: Vec<PolicyAckCount>,
}

// ---------------------------------------------------------------------------
// Timestamp encoding
// ---------------------------------------------------------------------------

/// Canonical text form used for storage and for signature hashing, so a
/// row read back from the store hashes identically to the one written.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::internal(format!("corrupt timestamp '{}': {}", s, e)))
}
