use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use policyflow_core::{
    ensure_super_admin_remains, format_timestamp, parse_timestamp, Acknowledgement, CoreError,
    CoreResult, Department, DocumentStore, NewAcknowledgement, NewPolicy, NewPolicyVersion,
    NewUser, Policy, PolicyFilter, PolicyStatus, PolicyUpdate, PolicyVersion, Stats, User,
    UserUpdate,
};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::migrations;

/// SQLite implementation of the PolicyFlow document store.
///
/// One connection behind a mutex: every statement, read or write, is
/// serialized, which gives the single-writer guarantee. Multi-statement
/// operations additionally run inside a transaction so a failure midway
/// leaves nothing behind. The database runs in WAL mode so external readers
/// (backups, the sqlite3 shell) never see a partial write either.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path and apply pending
    /// migrations.
    pub fn open(path: &str) -> CoreResult<Self> {
        let mut conn = Connection::open(path)
            .map_err(|e| CoreError::internal(format!("failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| CoreError::internal(format!("failed to set pragmas: {}", e)))?;

        let applied = migrations::run(&mut conn)?;
        if !applied.is_empty() {
            info!(count = applied.len(), path, "database migrated");
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> CoreResult<Self> {
        Self::open(":memory:")
    }

    pub fn applied_migrations(&self) -> CoreResult<Vec<String>> {
        let conn = self.lock()?;
        migrations::applied(&conn)
    }

    pub(crate) fn lock(&self) -> CoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CoreError::internal(format!("lock poisoned: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Map a rusqlite error for a row of kind `what` onto the core taxonomy.
pub(crate) fn classify(what: &str, e: rusqlite::Error) -> CoreError {
    match &e {
        rusqlite::Error::QueryReturnedNoRows => CoreError::not_found(format!("{} not found", what)),
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            match err.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    CoreError::conflict(format!("{} already exists", what))
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    CoreError::conflict(format!("{} is referenced by other records", what))
                }
                ffi::SQLITE_CONSTRAINT_CHECK => {
                    CoreError::invalid(format!("{} violates the visibility scope rule", what))
                }
                _ => CoreError::internal(format!("{} constraint failed: {}", what, e)),
            }
        }
        _ => CoreError::internal(format!("{} query failed: {}", what, e)),
    }
}

fn corrupt(what: &str) -> impl Fn(CoreError) -> CoreError + '_ {
    move |e| CoreError::internal(format!("corrupt {} row: {}", what, e.message()))
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const DEPARTMENT_SELECT: &str =
    "SELECT id, name, description, created_at, updated_at FROM departments";

fn department_from_row(row: &Row<'_>) -> rusqlite::Result<(Department, String, String)> {
    Ok((
        Department {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        row.get(3)?,
        row.get(4)?,
    ))
}

fn finish_department(raw: (Department, String, String)) -> CoreResult<Department> {
    let (mut dept, created_at, updated_at) = raw;
    dept.created_at = parse_timestamp(&created_at).map_err(corrupt("department"))?;
    dept.updated_at = parse_timestamp(&updated_at).map_err(corrupt("department"))?;
    Ok(dept)
}

const USER_SELECT: &str = "SELECT u.id, u.email, u.name, u.role, u.department_id, d.name,
            u.created_by, u.created_at
     FROM users u LEFT JOIN departments d ON u.department_id = d.id";

struct UserRow {
    id: String,
    email: String,
    name: String,
    role: String,
    department_id: Option<String>,
    department_name: Option<String>,
    created_by: Option<String>,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: row.get(3)?,
            department_id: row.get(4)?,
            department_name: row.get(5)?,
            created_by: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_user(self) -> CoreResult<User> {
        Ok(User {
            id: self.id,
            email: self.email,
            name: self.name,
            role: self.role.parse().map_err(corrupt("user"))?,
            department_id: self.department_id,
            department_name: self.department_name,
            created_by: self.created_by,
            created_at: parse_timestamp(&self.created_at).map_err(corrupt("user"))?,
        })
    }
}

const POLICY_SELECT: &str = "SELECT p.id, p.title, p.status, p.visibility_type, p.department_id,
            d.name, p.current_version_id, p.created_at
     FROM policies p LEFT JOIN departments d ON p.department_id = d.id";

struct PolicyRow {
    id: String,
    title: String,
    status: String,
    visibility_type: String,
    department_id: Option<String>,
    department_name: Option<String>,
    current_version_id: Option<String>,
    created_at: String,
}

impl PolicyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            status: row.get(2)?,
            visibility_type: row.get(3)?,
            department_id: row.get(4)?,
            department_name: row.get(5)?,
            current_version_id: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_policy(self) -> CoreResult<Policy> {
        Ok(Policy {
            id: self.id,
            title: self.title,
            status: self.status.parse().map_err(corrupt("policy"))?,
            visibility_type: self.visibility_type.parse().map_err(corrupt("policy"))?,
            department_id: self.department_id,
            department_name: self.department_name,
            current_version_id: self.current_version_id,
            created_at: parse_timestamp(&self.created_at).map_err(corrupt("policy"))?,
        })
    }
}

const VERSION_SELECT: &str =
    "SELECT id, policy_id, content, version_string, changelog, created_at FROM policy_versions";

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<(PolicyVersion, String)> {
    Ok((
        PolicyVersion {
            id: row.get(0)?,
            policy_id: row.get(1)?,
            content: row.get(2)?,
            version_string: row.get(3)?,
            changelog: row.get(4)?,
            created_at: Utc::now(),
        },
        row.get(5)?,
    ))
}

fn finish_version(raw: (PolicyVersion, String)) -> CoreResult<PolicyVersion> {
    let (mut version, created_at) = raw;
    version.created_at = parse_timestamp(&created_at).map_err(corrupt("policy version"))?;
    Ok(version)
}

const ACK_SELECT: &str =
    "SELECT id, user_id, policy_version_id, timestamp, signature_hash FROM acknowledgements";

fn ack_from_row(row: &Row<'_>) -> rusqlite::Result<(Acknowledgement, String)> {
    Ok((
        Acknowledgement {
            id: row.get(0)?,
            user_id: row.get(1)?,
            policy_version_id: row.get(2)?,
            timestamp: Utc::now(),
            signature_hash: row.get(4)?,
        },
        row.get(3)?,
    ))
}

fn finish_ack(raw: (Acknowledgement, String)) -> CoreResult<Acknowledgement> {
    let (mut ack, timestamp) = raw;
    ack.timestamp = parse_timestamp(&timestamp).map_err(corrupt("acknowledgement"))?;
    Ok(ack)
}

// ---------------------------------------------------------------------------
// Connection-level statements
//
// Shared by the trait methods and by multi-statement sequences that run
// inside a transaction (a Transaction derefs to Connection).
// ---------------------------------------------------------------------------

pub(crate) fn fetch_department(conn: &Connection, id: &str) -> CoreResult<Department> {
    let raw = conn
        .query_row(
            &format!("{} WHERE id = ?1", DEPARTMENT_SELECT),
            params![id],
            department_from_row,
        )
        .map_err(|e| classify("department", e))?;
    finish_department(raw)
}

pub(crate) fn fetch_user(conn: &Connection, id: &str) -> CoreResult<User> {
    conn.query_row(
        &format!("{} WHERE u.id = ?1", USER_SELECT),
        params![id],
        UserRow::from_row,
    )
    .map_err(|e| classify("user", e))?
    .into_user()
}

pub(crate) fn fetch_policy(conn: &Connection, id: &str) -> CoreResult<Policy> {
    conn.query_row(
        &format!("{} WHERE p.id = ?1", POLICY_SELECT),
        params![id],
        PolicyRow::from_row,
    )
    .map_err(|e| classify("policy", e))?
    .into_policy()
}

pub(crate) fn fetch_version(conn: &Connection, id: &str) -> CoreResult<PolicyVersion> {
    let raw = conn
        .query_row(
            &format!("{} WHERE id = ?1", VERSION_SELECT),
            params![id],
            version_from_row,
        )
        .map_err(|e| classify("policy version", e))?;
    finish_version(raw)
}

pub(crate) fn insert_user(conn: &Connection, user: &NewUser) -> CoreResult<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO users (id, email, name, role, department_id, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            user.email,
            user.name,
            user.role.as_str(),
            user.department_id,
            user.created_by,
            format_timestamp(&Utc::now()),
        ],
    )
    .map_err(|e| classify("user", e))?;
    Ok(id)
}

pub(crate) fn insert_policy(conn: &Connection, policy: &NewPolicy) -> CoreResult<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO policies (id, title, status, visibility_type, department_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            policy.title,
            PolicyStatus::Draft.as_str(),
            policy.visibility_type.as_str(),
            policy.department_id,
            format_timestamp(&Utc::now()),
        ],
    )
    .map_err(|e| classify("policy", e))?;
    Ok(id)
}

pub(crate) fn write_policy(conn: &Connection, id: &str, update: &PolicyUpdate) -> CoreResult<()> {
    let rows = conn
        .execute(
            "UPDATE policies SET title = ?1, status = ?2, visibility_type = ?3, department_id = ?4
             WHERE id = ?5",
            params![
                update.title,
                update.status.as_str(),
                update.visibility_type.as_str(),
                update.department_id,
                id,
            ],
        )
        .map_err(|e| classify("policy", e))?;
    if rows == 0 {
        return Err(CoreError::not_found("policy not found"));
    }
    Ok(())
}

/// Insert a version row and repoint its policy. Caller provides atomicity.
pub(crate) fn insert_version_as_current(
    conn: &Connection,
    policy_id: &str,
    version: &NewPolicyVersion,
) -> CoreResult<String> {
    // Surface a missing policy as NotFound rather than a foreign key failure.
    fetch_policy(conn, policy_id)?;

    let id = new_id();
    conn.execute(
        "INSERT INTO policy_versions (id, policy_id, content, version_string, changelog, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            policy_id,
            version.content,
            version.version_string,
            version.changelog,
            format_timestamp(&Utc::now()),
        ],
    )
    .map_err(|e| classify("policy version", e))?;
    conn.execute(
        "UPDATE policies SET current_version_id = ?1 WHERE id = ?2",
        params![id, policy_id],
    )
    .map_err(|e| classify("policy", e))?;
    Ok(id)
}

fn super_admins(conn: &Connection) -> CoreResult<u64> {
    count(conn, "SELECT COUNT(*) FROM users WHERE role = 'SuperAdmin'")
}

fn count(conn: &Connection, sql: &str) -> CoreResult<u64> {
    let n: i64 = conn
        .query_row(sql, [], |row| row.get(0))
        .map_err(|e| classify("stats", e))?;
    Ok(n.max(0) as u64)
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

impl DocumentStore for SqliteStore {
    fn create_department(&self, name: &str, description: &str) -> CoreResult<Department> {
        let conn = self.lock()?;
        let id = new_id();
        let now = format_timestamp(&Utc::now());
        conn.execute(
            "INSERT INTO departments (id, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, name, description, now],
        )
        .map_err(|e| classify("department", e))?;
        debug!(department_id = %id, "department inserted");
        fetch_department(&conn, &id)
    }

    fn get_department(&self, id: &str) -> CoreResult<Department> {
        let conn = self.lock()?;
        fetch_department(&conn, id)
    }

    fn list_departments(&self) -> CoreResult<Vec<Department>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{} ORDER BY name ASC", DEPARTMENT_SELECT))
            .map_err(|e| classify("department", e))?;
        let rows = stmt
            .query_map([], department_from_row)
            .map_err(|e| classify("department", e))?;
        let items = rows
            .map(|r| r.map_err(|e| classify("department", e)).and_then(finish_department))
            .collect();
        items
    }

    fn update_department(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> CoreResult<Department> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE departments SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                params![name, description, format_timestamp(&Utc::now()), id],
            )
            .map_err(|e| classify("department", e))?;
        if rows == 0 {
            return Err(CoreError::not_found("department not found"));
        }
        fetch_department(&conn, id)
    }

    fn delete_department(&self, id: &str) -> CoreResult<()> {
        let conn = self.lock()?;
        let rows = conn
            .execute("DELETE FROM departments WHERE id = ?1", params![id])
            .map_err(|e| classify("department", e))?;
        if rows == 0 {
            return Err(CoreError::not_found("department not found"));
        }
        Ok(())
    }

    fn department_has_policies(&self, id: &str) -> CoreResult<bool> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM policies WHERE department_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| classify("policy", e))?;
        Ok(n > 0)
    }

    fn create_user(&self, user: &NewUser) -> CoreResult<User> {
        let conn = self.lock()?;
        let id = insert_user(&conn, user)?;
        fetch_user(&conn, &id)
    }

    fn get_user(&self, id: &str) -> CoreResult<User> {
        let conn = self.lock()?;
        fetch_user(&conn, id)
    }

    fn get_user_by_email(&self, email: &str) -> CoreResult<User> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{} WHERE u.email = ?1", USER_SELECT),
            params![email],
            UserRow::from_row,
        )
        .map_err(|e| classify("user", e))?
        .into_user()
    }

    fn list_users(&self, department_id: Option<&str>) -> CoreResult<Vec<User>> {
        let conn = self.lock()?;
        let (sql, args): (String, Vec<&str>) = match department_id {
            Some(dept) => (
                format!(
                    "{} WHERE u.department_id = ?1 ORDER BY u.created_at ASC, u.rowid ASC",
                    USER_SELECT
                ),
                vec![dept],
            ),
            None => (
                format!("{} ORDER BY u.created_at ASC, u.rowid ASC", USER_SELECT),
                Vec::new(),
            ),
        };
        let mut stmt = conn.prepare(&sql).map_err(|e| classify("user", e))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), UserRow::from_row)
            .map_err(|e| classify("user", e))?;
        let items = rows
            .map(|r| r.map_err(|e| classify("user", e)).and_then(UserRow::into_user))
            .collect();
        items
    }

    fn update_user(&self, id: &str, update: &UserUpdate) -> CoreResult<User> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| classify("user", e))?;

        let current = fetch_user(&tx, id)?;
        ensure_super_admin_remains(current.role, Some(update.role), super_admins(&tx)?)?;
        tx.execute(
            "UPDATE users SET name = ?1, email = ?2, role = ?3, department_id = ?4 WHERE id = ?5",
            params![
                update.name,
                update.email,
                update.role.as_str(),
                update.department_id,
                id,
            ],
        )
        .map_err(|e| classify("user", e))?;
        let user = fetch_user(&tx, id)?;

        tx.commit().map_err(|e| classify("user", e))?;
        Ok(user)
    }

    fn delete_user(&self, id: &str) -> CoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| classify("user", e))?;

        let current = fetch_user(&tx, id)?;
        ensure_super_admin_remains(current.role, None, super_admins(&tx)?)?;
        tx.execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(|e| classify("user", e))?;

        tx.commit().map_err(|e| classify("user", e))
    }

    fn count_super_admins(&self) -> CoreResult<u64> {
        let conn = self.lock()?;
        super_admins(&conn)
    }

    fn create_policy(&self, policy: &NewPolicy) -> CoreResult<Policy> {
        let conn = self.lock()?;
        let id = insert_policy(&conn, policy)?;
        fetch_policy(&conn, &id)
    }

    fn get_policy(&self, id: &str) -> CoreResult<Policy> {
        let conn = self.lock()?;
        fetch_policy(&conn, id)
    }

    fn list_policies(&self, filter: &PolicyFilter) -> CoreResult<Vec<Policy>> {
        let conn = self.lock()?;
        let order = "ORDER BY p.created_at DESC, p.rowid DESC";
        let (sql, args): (String, Vec<&str>) = match filter {
            PolicyFilter::All => (format!("{} {}", POLICY_SELECT, order), Vec::new()),
            PolicyFilter::OrganizationOnly => (
                format!(
                    "{} WHERE p.visibility_type = 'organization' {}",
                    POLICY_SELECT, order
                ),
                Vec::new(),
            ),
            PolicyFilter::OrganizationAndDepartment(dept) => (
                format!(
                    "{} WHERE p.visibility_type = 'organization'
                        OR (p.visibility_type = 'department' AND p.department_id = ?1) {}",
                    POLICY_SELECT, order
                ),
                vec![dept.as_str()],
            ),
        };
        let mut stmt = conn.prepare(&sql).map_err(|e| classify("policy", e))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), PolicyRow::from_row)
            .map_err(|e| classify("policy", e))?;
        let items = rows
            .map(|r| r.map_err(|e| classify("policy", e)).and_then(PolicyRow::into_policy))
            .collect();
        items
    }

    fn update_policy(&self, id: &str, update: &PolicyUpdate) -> CoreResult<Policy> {
        let conn = self.lock()?;
        write_policy(&conn, id, update)?;
        fetch_policy(&conn, id)
    }

    fn create_version(
        &self,
        policy_id: &str,
        version: &NewPolicyVersion,
    ) -> CoreResult<PolicyVersion> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| classify("policy version", e))?;
        let id = insert_version_as_current(&tx, policy_id, version)?;
        let created = fetch_version(&tx, &id)?;
        tx.commit().map_err(|e| classify("policy version", e))?;
        debug!(policy_id, version_id = %id, "version inserted and set current");
        Ok(created)
    }

    fn set_current_version(&self, policy_id: &str, version_id: &str) -> CoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| classify("policy", e))?;
        let version = fetch_version(&tx, version_id)?;
        if version.policy_id != policy_id {
            return Err(CoreError::invalid(format!(
                "version {} does not belong to policy {}",
                version_id, policy_id
            )));
        }
        let rows = tx
            .execute(
                "UPDATE policies SET current_version_id = ?1 WHERE id = ?2",
                params![version_id, policy_id],
            )
            .map_err(|e| classify("policy", e))?;
        if rows == 0 {
            return Err(CoreError::not_found("policy not found"));
        }
        tx.commit().map_err(|e| classify("policy", e))?;
        Ok(())
    }

    fn get_version(&self, id: &str) -> CoreResult<PolicyVersion> {
        let conn = self.lock()?;
        fetch_version(&conn, id)
    }

    fn list_versions(&self, policy_id: &str) -> CoreResult<Vec<PolicyVersion>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE policy_id = ?1 ORDER BY created_at DESC, rowid DESC",
                VERSION_SELECT
            ))
            .map_err(|e| classify("policy version", e))?;
        let rows = stmt
            .query_map(params![policy_id], version_from_row)
            .map_err(|e| classify("policy version", e))?;
        let items = rows
            .map(|r| r.map_err(|e| classify("policy version", e)).and_then(finish_version))
            .collect();
        items
    }

    fn create_acknowledgement(&self, ack: &NewAcknowledgement) -> CoreResult<Acknowledgement> {
        let conn = self.lock()?;
        let id = new_id();
        conn.execute(
            "INSERT INTO acknowledgements (id, user_id, policy_version_id, timestamp, signature_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                ack.user_id,
                ack.policy_version_id,
                format_timestamp(&ack.timestamp),
                ack.signature_hash,
            ],
        )
        .map_err(|e| classify("acknowledgement", e))?;
        let raw = conn
            .query_row(
                &format!("{} WHERE id = ?1", ACK_SELECT),
                params![id],
                ack_from_row,
            )
            .map_err(|e| classify("acknowledgement", e))?;
        finish_ack(raw)
    }

    fn has_acknowledged(&self, user_id: &str, policy_version_id: &str) -> CoreResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM acknowledgements WHERE user_id = ?1 AND policy_version_id = ?2",
                params![user_id, policy_version_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| classify("acknowledgement", e))?;
        Ok(found.is_some())
    }

    fn acknowledged_versions(&self, user_id: &str) -> CoreResult<HashSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT policy_version_id FROM acknowledgements WHERE user_id = ?1")
            .map_err(|e| classify("acknowledgement", e))?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(|e| classify("acknowledgement", e))?;
        let items = rows
            .map(|r| r.map_err(|e| classify("acknowledgement", e)))
            .collect();
        items
    }

    fn list_acknowledgements(&self, policy_version_id: &str) -> CoreResult<Vec<Acknowledgement>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{} WHERE policy_version_id = ?1 ORDER BY timestamp DESC, rowid DESC",
                ACK_SELECT
            ))
            .map_err(|e| classify("acknowledgement", e))?;
        let rows = stmt
            .query_map(params![policy_version_id], ack_from_row)
            .map_err(|e| classify("acknowledgement", e))?;
        let items = rows
            .map(|r| r.map_err(|e| classify("acknowledgement", e)).and_then(finish_ack))
            .collect();
        items
    }

    fn stats(&self) -> CoreResult<Stats> {
        let conn = self.lock()?;
        let mut stats = Stats {
            total_users: count(&conn, "SELECT COUNT(*) FROM users")?,
            total_policies: count(&conn, "SELECT COUNT(*) FROM policies")?,
            total_ack_count: count(&conn, "SELECT COUNT(*) FROM acknowledgements")?,
            ..Stats::default()
        };

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM policies GROUP BY status")
            .map_err(|e| classify("stats", e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| classify("stats", e))?;
        for row in rows {
            let (status, n) = row.map_err(|e| classify("stats", e))?;
            let n = n.max(0) as u64;
            match status.parse::<PolicyStatus>().map_err(corrupt("policy"))? {
                PolicyStatus::Draft => stats.draft_count = n,
                PolicyStatus::Review => stats.review_count = n,
                PolicyStatus::Published => stats.published_count = n,
                PolicyStatus::Archived => stats.archived_count = n,
            }
        }
        Ok(stats)
    }
}
