//! Progress store database schema.

/// SQL creating every progress table; identical to the checked-in migration.
pub const CREATE_PROGRESS_TABLES: &str =
    include_str!("../../../migrations/0001_create_progress_tables.sql");
