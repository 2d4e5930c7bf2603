//! Waymark Store — `PostgreSQL` implementation of the progress store.

pub mod pg_progress_store;
pub mod schema;

pub use pg_progress_store::PgProgressStore;
