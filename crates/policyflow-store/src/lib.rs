pub mod migrations;
pub mod seed;
pub mod storage;

pub use seed::SeedOutcome;
pub use storage::SqliteStore;
