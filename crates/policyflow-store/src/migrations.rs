//! Append-only schema migration log.
//!
//! Migrations are applied in list order, each inside its own transaction
//! together with its `schema_migrations` bookkeeping row, so a crash never
//! leaves a half-applied step recorded as done. Never remove or reorder
//! entries; only append.

use chrono::Utc;
use policyflow_core::{format_timestamp, CoreError, CoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

/// A single named schema change.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "001_create_departments",
        sql: "CREATE TABLE IF NOT EXISTS departments (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    },
    Migration {
        name: "002_create_users",
        sql: "CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            email         TEXT NOT NULL UNIQUE,
            name          TEXT NOT NULL,
            role          TEXT NOT NULL DEFAULT 'Staff',
            department_id TEXT REFERENCES departments(id) ON DELETE SET NULL,
            created_by    TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at    TEXT NOT NULL
        );",
    },
    Migration {
        name: "003_create_policies",
        sql: "CREATE TABLE IF NOT EXISTS policies (
            id                 TEXT PRIMARY KEY,
            title              TEXT NOT NULL,
            status             TEXT NOT NULL DEFAULT 'Draft',
            visibility_type    TEXT NOT NULL DEFAULT 'organization',
            department_id      TEXT REFERENCES departments(id),
            current_version_id TEXT,
            created_at         TEXT NOT NULL,
            CHECK (
                (visibility_type = 'organization' AND department_id IS NULL) OR
                (visibility_type = 'department' AND department_id IS NOT NULL)
            )
        );",
    },
    Migration {
        name: "004_create_policy_versions",
        sql: "CREATE TABLE IF NOT EXISTS policy_versions (
            id             TEXT PRIMARY KEY,
            policy_id      TEXT NOT NULL REFERENCES policies(id),
            content        TEXT NOT NULL,
            version_string TEXT NOT NULL,
            changelog      TEXT NOT NULL DEFAULT '',
            created_at     TEXT NOT NULL
        );",
    },
    Migration {
        name: "005_create_acknowledgements",
        sql: "CREATE TABLE IF NOT EXISTS acknowledgements (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL REFERENCES users(id),
            policy_version_id TEXT NOT NULL REFERENCES policy_versions(id),
            timestamp         TEXT NOT NULL,
            signature_hash    TEXT NOT NULL,
            UNIQUE (user_id, policy_version_id)
        );",
    },
    Migration {
        name: "006_lookup_indexes",
        sql: "CREATE INDEX IF NOT EXISTS idx_policies_department ON policies(department_id);
              CREATE INDEX IF NOT EXISTS idx_versions_policy ON policy_versions(policy_id);
              CREATE INDEX IF NOT EXISTS idx_acks_version ON acknowledgements(policy_version_id);
              CREATE INDEX IF NOT EXISTS idx_users_department ON users(department_id);",
    },
    Migration {
        name: "007_acknowledgements_follow_user_delete",
        sql: "CREATE TABLE acknowledgements_new (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            policy_version_id TEXT NOT NULL REFERENCES policy_versions(id),
            timestamp         TEXT NOT NULL,
            signature_hash    TEXT NOT NULL,
            UNIQUE (user_id, policy_version_id)
        );
        INSERT INTO acknowledgements_new (id, user_id, policy_version_id, timestamp, signature_hash)
            SELECT id, user_id, policy_version_id, timestamp, signature_hash FROM acknowledgements;
        DROP TABLE acknowledgements;
        ALTER TABLE acknowledgements_new RENAME TO acknowledgements;
        CREATE INDEX IF NOT EXISTS idx_acks_version ON acknowledgements(policy_version_id);",
    },
];

fn ensure_log_table(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name       TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .map_err(|e| CoreError::internal(format!("create schema_migrations: {}", e)))
}

/// Apply every pending migration. Returns the names applied by this call;
/// an up-to-date database yields an empty list.
pub fn run(conn: &mut Connection) -> CoreResult<Vec<&'static str>> {
    run_list(conn, MIGRATIONS)
}

fn run_list(conn: &mut Connection, migrations: &[Migration]) -> CoreResult<Vec<&'static str>> {
    ensure_log_table(conn)?;

    let mut applied = Vec::new();
    for migration in migrations {
        let already: Option<String> = conn
            .query_row(
                "SELECT name FROM schema_migrations WHERE name = ?1",
                params![migration.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CoreError::internal(format!("read schema_migrations: {}", e)))?;
        if already.is_some() {
            continue;
        }

        info!(migration = migration.name, "applying migration");
        let tx = conn
            .transaction()
            .map_err(|e| CoreError::internal(format!("begin migration: {}", e)))?;
        tx.execute_batch(migration.sql).map_err(|e| {
            CoreError::internal(format!("migration {}: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)",
            params![migration.name, format_timestamp(&Utc::now())],
        )
        .map_err(|e| CoreError::internal(format!("record migration {}: {}", migration.name, e)))?;
        tx.commit()
            .map_err(|e| CoreError::internal(format!("commit migration {}: {}", migration.name, e)))?;

        applied.push(migration.name);
    }
    Ok(applied)
}

/// Names of applied migrations in application order.
pub fn applied(conn: &Connection) -> CoreResult<Vec<String>> {
    ensure_log_table(conn)?;
    let mut stmt = conn
        .prepare("SELECT name FROM schema_migrations ORDER BY applied_at ASC, rowid ASC")
        .map_err(|e| CoreError::internal(format!("read schema_migrations: {}", e)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| CoreError::internal(format!("read schema_migrations: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::internal(format!("read schema_migrations: {}", e)))?;
    Ok(names)
}
