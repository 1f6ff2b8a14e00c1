use chrono::Utc;
use policyflow_core::{
    signature_hash, verify_signature_hash, Acknowledgement, CallerContext, CoreError, CoreResult,
    DocumentStore, ErrorKind, NewAcknowledgement, NewPolicy, NewPolicyVersion, Policy,
    PolicyDetail, PolicyInput, PolicyListItem, PolicyPatch, PolicyStatus, PolicyUpdate,
    PolicyVersion, VersionInput, VisibilityType,
};
use tracing::{debug, info};

use crate::guard;
use crate::rule::{admit, Operation};
use crate::visibility;

/// Treat absent and blank values the same way.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// PolicyEngine — policy lifecycle over a document store
// ---------------------------------------------------------------------------

/// Policy lifecycle engine.
///
/// Every entry point takes the caller explicitly, runs it through the
/// authorization guard, validates the sanitized change-set and only then
/// touches the store. Nothing is retried; a failure leaves the store as it
/// was.
pub struct PolicyEngine<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> PolicyEngine<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Create a Draft policy with no current version.
    pub fn create_policy(&self, caller: &CallerContext, input: PolicyInput) -> CoreResult<Policy> {
        let input = guard::authorize_create_policy(caller, input)?;

        let title = input.title.trim();
        if title.is_empty() {
            return Err(CoreError::invalid("title is required"));
        }
        let visibility = match non_empty(input.visibility_type) {
            Some(v) => v.parse::<VisibilityType>()?,
            None => VisibilityType::Organization,
        };
        let department_id = non_empty(input.department_id);
        if visibility == VisibilityType::Organization && department_id.is_some() {
            return Err(CoreError::invalid(
                "organization-wide policies cannot name a department",
            ));
        }
        let department_id = self.resolve_department(visibility, department_id)?;

        let policy = self.store.create_policy(&NewPolicy {
            title: title.to_string(),
            visibility_type: visibility,
            department_id,
        })?;
        info!(
            user_id = %caller.user_id,
            policy_id = %policy.id,
            visibility = %policy.visibility_type,
            "policy created"
        );
        Ok(policy)
    }

    /// Merge a change-set into an existing policy. Absent or blank fields
    /// keep their stored value; switching to organization-wide drops the
    /// department.
    pub fn update_policy(
        &self,
        caller: &CallerContext,
        policy_id: &str,
        patch: PolicyPatch,
    ) -> CoreResult<Policy> {
        let target = self.store.get_policy(policy_id)?;
        let patch = guard::authorize_update_policy(caller, &target, patch)?;

        let title = non_empty(patch.title).unwrap_or_else(|| target.title.clone());
        let status = match non_empty(patch.status) {
            Some(s) => s.parse::<PolicyStatus>()?,
            None => target.status,
        };
        let visibility = match non_empty(patch.visibility_type) {
            Some(v) => v.parse::<VisibilityType>()?,
            None => target.visibility_type,
        };
        let requested_department = non_empty(patch.department_id);
        let department_id = match visibility {
            VisibilityType::Organization => {
                if requested_department.is_some() {
                    return Err(CoreError::invalid(
                        "organization-wide policies cannot name a department",
                    ));
                }
                None
            }
            VisibilityType::Department => {
                requested_department.or_else(|| target.department_id.clone())
            }
        };
        let department_id = self.resolve_department(visibility, department_id)?;

        let updated = self.store.update_policy(
            &target.id,
            &PolicyUpdate {
                title,
                status,
                visibility_type: visibility,
                department_id,
            },
        )?;
        if updated.status != target.status {
            info!(
                user_id = %caller.user_id,
                policy_id = %updated.id,
                from = %target.status,
                to = %updated.status,
                "policy status changed"
            );
        } else {
            info!(user_id = %caller.user_id, policy_id = %updated.id, "policy updated");
        }
        Ok(updated)
    }

    /// Append an immutable version and make it current.
    pub fn create_version(
        &self,
        caller: &CallerContext,
        policy_id: &str,
        input: VersionInput,
    ) -> CoreResult<PolicyVersion> {
        let target = self.store.get_policy(policy_id)?;
        guard::authorize_create_version(caller, &target)?;

        if input.content.trim().is_empty() || input.version_string.trim().is_empty() {
            return Err(CoreError::invalid(
                "content and version_string are required",
            ));
        }

        let version = self.store.create_version(
            &target.id,
            &NewPolicyVersion {
                content: input.content,
                version_string: input.version_string.trim().to_string(),
                changelog: input.changelog,
            },
        )?;
        info!(
            user_id = %caller.user_id,
            policy_id = %target.id,
            version_id = %version.id,
            version = %version.version_string,
            "policy version created"
        );
        Ok(version)
    }

    /// Point the policy back (or forward) at one of its existing versions.
    pub fn set_current_version(
        &self,
        caller: &CallerContext,
        policy_id: &str,
        version_id: &str,
    ) -> CoreResult<Policy> {
        let target = self.store.get_policy(policy_id)?;
        guard::authorize_create_version(caller, &target)?;

        self.store
            .set_current_version(&target.id, version_id)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CoreError::invalid(format!("unknown version {}", version_id)),
                _ => e,
            })?;
        info!(
            user_id = %caller.user_id,
            policy_id = %target.id,
            version_id,
            "current version switched"
        );
        self.store.get_policy(&target.id)
    }

    /// Record the caller's acknowledgement of the policy's current version.
    pub fn acknowledge(&self, caller: &CallerContext, policy_id: &str) -> CoreResult<Acknowledgement> {
        admit(caller, Operation::Acknowledge)?;
        let policy = visibility::get_visible_policy(self.store, caller, policy_id)?;

        if policy.status != PolicyStatus::Published {
            return Err(CoreError::invalid(
                "can only acknowledge published policies",
            ));
        }
        let version_id = policy
            .current_version_id
            .ok_or_else(|| CoreError::invalid("policy has no current version"))?;

        if self.store.has_acknowledged(&caller.user_id, &version_id)? {
            return Err(CoreError::conflict("already acknowledged"));
        }

        let timestamp = Utc::now();
        let ack = self.store.create_acknowledgement(&NewAcknowledgement {
            user_id: caller.user_id.clone(),
            policy_version_id: version_id.clone(),
            timestamp,
            signature_hash: signature_hash(&caller.user_id, &version_id, &timestamp),
        })?;
        info!(
            user_id = %caller.user_id,
            policy_id = %policy.id,
            version_id = %version_id,
            ack_id = %ack.id,
            "policy acknowledged"
        );
        Ok(ack)
    }

    /// Policy, its current version and whether the caller acknowledged it.
    pub fn get_policy_detail(
        &self,
        caller: &CallerContext,
        policy_id: &str,
    ) -> CoreResult<PolicyDetail> {
        admit(caller, Operation::ReadPolicies)?;
        let policy = visibility::get_visible_policy(self.store, caller, policy_id)?;

        let current_version = match policy.current_version_id.as_deref() {
            Some(version_id) => Some(self.store.get_version(version_id)?),
            None => None,
        };
        let acknowledged = match &current_version {
            Some(version) => self.store.has_acknowledged(&caller.user_id, &version.id)?,
            None => false,
        };
        debug!(user_id = %caller.user_id, policy_id, acknowledged, "policy detail read");
        Ok(PolicyDetail {
            policy,
            current_version,
            acknowledged,
        })
    }

    /// Full version history, newest first.
    pub fn list_versions(
        &self,
        caller: &CallerContext,
        policy_id: &str,
    ) -> CoreResult<Vec<PolicyVersion>> {
        admit(caller, Operation::ReadPolicies)?;
        let policy = visibility::get_visible_policy(self.store, caller, policy_id)?;
        self.store.list_versions(&policy.id)
    }

    /// Visible policies, each flagged with whether the caller acknowledged
    /// its current version.
    pub fn list_with_ack(&self, caller: &CallerContext) -> CoreResult<Vec<PolicyListItem>> {
        admit(caller, Operation::ReadPolicies)?;
        let policies = visibility::list_visible_policies(self.store, caller)?;
        let acknowledged = self.store.acknowledged_versions(&caller.user_id)?;

        Ok(policies
            .into_iter()
            .map(|policy| {
                let acked = policy
                    .current_version_id
                    .as_ref()
                    .is_some_and(|v| acknowledged.contains(v));
                PolicyListItem {
                    policy,
                    acknowledged: acked,
                }
            })
            .collect())
    }

    /// Acknowledgements of the current version, newest first. Empty when the
    /// policy has no version yet.
    pub fn list_acknowledgements(
        &self,
        caller: &CallerContext,
        policy_id: &str,
    ) -> CoreResult<Vec<Acknowledgement>> {
        let policy = self.store.get_policy(policy_id)?;
        guard::authorize_list_acknowledgements(caller, &policy)?;
        match policy.current_version_id.as_deref() {
            Some(version_id) => self.store.list_acknowledgements(version_id),
            None => Ok(Vec::new()),
        }
    }

    /// Recompute a stored acknowledgement's signature hash.
    pub fn verify_acknowledgement(&self, ack: &Acknowledgement) -> bool {
        verify_signature_hash(ack)
    }

    /// Enforce the scope invariant and check the department exists.
    fn resolve_department(
        &self,
        visibility: VisibilityType,
        department_id: Option<String>,
    ) -> CoreResult<Option<String>> {
        match (visibility, department_id) {
            (VisibilityType::Organization, _) => Ok(None),
            (VisibilityType::Department, None) => Err(CoreError::invalid(
                "department-scoped policies require a department_id",
            )),
            (VisibilityType::Department, Some(dept)) => match self.store.get_department(&dept) {
                Ok(_) => Ok(Some(dept)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    Err(CoreError::invalid(format!("unknown department {}", dept)))
                }
                Err(e) => Err(e),
            },
        }
    }
}
