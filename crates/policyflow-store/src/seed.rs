//! First-run bootstrap: one SuperAdmin, a Staff test account and a
//! published sample policy.

use policyflow_core::{
    CoreError, CoreResult, NewPolicy, NewPolicyVersion, NewUser, PolicyStatus, PolicyUpdate, Role,
    VisibilityType,
};
use rusqlite::params;
use tracing::info;

use crate::storage::{
    fetch_policy, insert_policy, insert_user, insert_version_as_current, write_policy, SqliteStore,
};

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@policyflow.local";
pub const DEFAULT_ADMIN_NAME: &str = "Policy Admin";
pub const SAMPLE_STAFF_EMAIL: &str = "staff@policyflow.local";
const SAMPLE_STAFF_NAME: &str = "Test Staff";

const SAMPLE_TITLE: &str = "Employee Code of Conduct";
const SAMPLE_VERSION: &str = "v1.0.0";
const SAMPLE_CHANGELOG: &str = "Initial release";
const SAMPLE_CONTENT: &str = "# Employee Code of Conduct

## 1. Purpose

This Code of Conduct establishes the standards of professional behavior expected of all employees. It applies to all staff members regardless of their position or department.

## 2. Core Principles

- **Integrity**: Act honestly and ethically in all interactions
- **Respect**: Treat every colleague, customer, and partner with dignity
- **Accountability**: Take responsibility for your actions and decisions
- **Confidentiality**: Protect sensitive business and personal information

## 3. Professional Conduct

Employees are expected to:

- Arrive on time and fulfill their job responsibilities
- Communicate professionally in all forms of correspondence
- Avoid conflicts of interest and disclose potential conflicts to management
- Comply with all applicable laws and company policies

## 4. Workplace Respect

We are committed to a work environment free from:
- Harassment, discrimination, or bullying of any kind
- Retaliation against those who report concerns in good faith

## 5. Reporting Violations

If you observe or experience a violation of this policy, report it immediately to your manager, HR, or through the anonymous ethics hotline.

## 6. Acknowledgement

By acknowledging this policy, you confirm that you have read, understood, and agree to comply with its terms.
";

/// Result of a seed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded {
        admin_id: String,
        staff_id: String,
        policy_id: String,
    },
    /// A SuperAdmin already exists; nothing was written.
    AlreadySeeded,
}

impl SqliteStore {
    /// Seed an empty database. Safe to call on every startup.
    ///
    /// Admin user, Staff test account, sample policy, its first version and
    /// the publish step are written in one transaction.
    pub fn seed(&self, admin_email: &str, admin_name: &str) -> CoreResult<SeedOutcome> {
        let email = admin_email.trim();
        let name = admin_name.trim();
        let email = if email.is_empty() { DEFAULT_ADMIN_EMAIL } else { email };
        let name = if name.is_empty() { DEFAULT_ADMIN_NAME } else { name };

        let mut conn = self.lock()?;
        let admins: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = ?1",
                params![Role::SuperAdmin.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| CoreError::internal(format!("seed check failed: {}", e)))?;
        if admins > 0 {
            return Ok(SeedOutcome::AlreadySeeded);
        }

        let tx = conn
            .transaction()
            .map_err(|e| CoreError::internal(format!("seed transaction: {}", e)))?;

        let admin_id = insert_user(
            &tx,
            &NewUser {
                email: email.to_string(),
                name: name.to_string(),
                role: Role::SuperAdmin,
                department_id: None,
                created_by: None,
            },
        )?;

        let staff_id = insert_user(
            &tx,
            &NewUser {
                email: SAMPLE_STAFF_EMAIL.to_string(),
                name: SAMPLE_STAFF_NAME.to_string(),
                role: Role::Staff,
                department_id: None,
                created_by: Some(admin_id.clone()),
            },
        )?;

        let policy_id = insert_policy(
            &tx,
            &NewPolicy {
                title: SAMPLE_TITLE.to_string(),
                visibility_type: VisibilityType::Organization,
                department_id: None,
            },
        )?;

        insert_version_as_current(
            &tx,
            &policy_id,
            &NewPolicyVersion {
                content: SAMPLE_CONTENT.to_string(),
                version_string: SAMPLE_VERSION.to_string(),
                changelog: SAMPLE_CHANGELOG.to_string(),
            },
        )?;

        let policy = fetch_policy(&tx, &policy_id)?;
        write_policy(
            &tx,
            &policy_id,
            &PolicyUpdate {
                title: policy.title,
                status: PolicyStatus::Published,
                visibility_type: policy.visibility_type,
                department_id: policy.department_id,
            },
        )?;

        tx.commit()
            .map_err(|e| CoreError::internal(format!("seed commit: {}", e)))?;

        info!(
            admin_email = email,
            admin_id = %admin_id,
            staff_id = %staff_id,
            policy_id = %policy_id,
            "database seeded"
        );
        Ok(SeedOutcome::Seeded {
            admin_id,
            staff_id,
            policy_id,
        })
    }
}
