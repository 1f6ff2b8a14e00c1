use policyflow_core::{
    CallerContext, CoreResult, DocumentStore, PolicyAckCount, PolicyStatus, StatsReport,
};
use tracing::debug;

use crate::rule::{admit, Operation};
use crate::visibility;

/// Admin dashboard numbers.
///
/// Totals are global. Per-policy acknowledgement counts cover the Published
/// policies with a current version that the caller can see.
pub fn stats_report(store: &dyn DocumentStore, caller: &CallerContext) -> CoreResult<StatsReport> {
    admit(caller, Operation::ViewStats)?;
    let stats = store.stats()?;

    let mut ack_counts = Vec::new();
    for policy in visibility::list_visible_policies(store, caller)? {
        if policy.status != PolicyStatus::Published {
            continue;
        }
        let Some(version_id) = policy.current_version_id.as_deref() else {
            continue;
        };
        let count = store.list_acknowledgements(version_id)?.len() as u64;
        ack_counts.push(PolicyAckCount {
            policy_id: policy.id,
            title: policy.title,
            ack_count: count,
        });
    }

    debug!(user_id = %caller.user_id, policies = ack_counts.len(), "stats computed");
    Ok(StatsReport { stats, ack_counts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PolicyEngine;
    use policyflow_core::{ErrorKind, NewUser, PolicyInput, PolicyPatch, Role, VersionInput};
    use policyflow_store::SqliteStore;

    fn add(store: &SqliteStore, email: &str, role: Role, dept: Option<&str>) -> CallerContext {
        let user = store
            .create_user(&NewUser {
                email: email.into(),
                name: email.into(),
                role,
                department_id: dept.map(str::to_string),
                created_by: None,
            })
            .unwrap();
        CallerContext::new(user.id, role, user.department_id)
    }

    fn published(
        engine: &PolicyEngine<'_>,
        root: &CallerContext,
        title: &str,
        dept: Option<&str>,
    ) -> String {
        let policy = engine
            .create_policy(
                root,
                PolicyInput {
                    title: title.into(),
                    visibility_type: Some(
                        if dept.is_some() { "department" } else { "organization" }.into(),
                    ),
                    department_id: dept.map(str::to_string),
                },
            )
            .unwrap();
        engine
            .create_version(
                root,
                &policy.id,
                VersionInput {
                    content: "text".into(),
                    version_string: "v1".into(),
                    changelog: String::new(),
                },
            )
            .unwrap();
        engine
            .update_policy(
                root,
                &policy.id,
                PolicyPatch {
                    status: Some("Published".into()),
                    ..PolicyPatch::default()
                },
            )
            .unwrap();
        policy.id
    }

    #[test]
    fn test_stats_counts_and_visible_ack_counts() {
        let store = SqliteStore::in_memory().unwrap();
        let eng = store.create_department("Engineering", "").unwrap().id;
        let hr = store.create_department("HR", "").unwrap().id;
        let root = add(&store, "root@example.com", Role::SuperAdmin, None);
        let lead = add(&store, "lead@example.com", Role::DeptAdmin, Some(&eng));
        let dev = add(&store, "dev@example.com", Role::Staff, Some(&eng));

        let engine = PolicyEngine::new(&store);
        let conduct = published(&engine, &root, "Conduct", None);
        let payroll = published(&engine, &root, "Payroll", Some(&hr));
        engine
            .create_policy(
                &root,
                PolicyInput {
                    title: "Draft idea".into(),
                    ..PolicyInput::default()
                },
            )
            .unwrap();
        engine.acknowledge(&dev, &conduct).unwrap();
        engine.acknowledge(&lead, &conduct).unwrap();

        let full = stats_report(&store, &root).unwrap();
        assert_eq!(full.stats.total_users, 3);
        assert_eq!(full.stats.total_policies, 3);
        assert_eq!(full.stats.published_count, 2);
        assert_eq!(full.stats.draft_count, 1);
        assert_eq!(full.stats.total_ack_count, 2);
        assert_eq!(full.ack_counts.len(), 2);
        let conduct_count = full
            .ack_counts
            .iter()
            .find(|c| c.policy_id == conduct)
            .map(|c| c.ack_count);
        assert_eq!(conduct_count, Some(2));

        let scoped = stats_report(&store, &lead).unwrap();
        assert_eq!(scoped.stats, full.stats);
        assert!(scoped.ack_counts.iter().all(|c| c.policy_id != payroll));
        assert_eq!(scoped.ack_counts.len(), 1);
    }

    #[test]
    fn test_staff_cannot_view_stats() {
        let store = SqliteStore::in_memory().unwrap();
        let dev = add(&store, "dev@example.com", Role::Staff, None);
        let err = stats_report(&store, &dev).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
