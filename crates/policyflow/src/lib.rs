//! PolicyFlow root library
//!
//! Ties the document store, the access layer and the HTTP surface together.
//! `initialize` opens (and migrates) the SQLite database, seeds a fresh
//! install when configured to, and returns the shared `AppState` the axum
//! router runs on.

pub mod config;
pub mod error;
pub mod http;
pub mod identity;

pub use config::{AppConfig, AuthConfig, BootstrapConfig, ServerConfig};
pub use error::{AppError, AppResult};
pub use http::{build_router, AppState};
pub use identity::{AuthError, SessionClaims, TokenIssuer};

use policyflow_store::{SeedOutcome, SqliteStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Open the configured database, creating its parent directory if needed.
/// Pending migrations are applied on open.
pub fn open_store(config: &AppConfig) -> AppResult<SqliteStore> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let path = config
        .database_path
        .to_str()
        .ok_or_else(|| AppError::Config("database_path is not valid UTF-8".into()))?;
    let store = SqliteStore::open(path)?;
    info!(path = %path, "database opened");
    Ok(store)
}

/// Seed an empty database with the bootstrap admin and sample policy.
pub fn seed_store(store: &SqliteStore, config: &AppConfig) -> AppResult<SeedOutcome> {
    let outcome = store.seed(&config.bootstrap.admin_email, &config.bootstrap.admin_name)?;
    match &outcome {
        SeedOutcome::Seeded {
            admin_id,
            staff_id,
            policy_id,
        } => {
            info!(
                admin_id = %admin_id,
                staff_id = %staff_id,
                policy_id = %policy_id,
                "database seeded"
            );
        }
        SeedOutcome::AlreadySeeded => info!("database already seeded, skipping"),
    }
    Ok(outcome)
}

/// Build the server state from configuration.
pub fn initialize(config: AppConfig) -> AppResult<AppState> {
    config.validate()?;
    if config.uses_insecure_secret() {
        warn!("using the built-in development session secret; set auth.session_secret");
    }

    let store = open_store(&config)?;
    if config.bootstrap.seed_on_start {
        seed_store(&store, &config)?;
    }

    let tokens = TokenIssuer::new(&config.auth.session_secret, config.auth.token_ttl_secs);
    Ok(AppState {
        store: Arc::new(store),
        tokens,
        config,
    })
}
