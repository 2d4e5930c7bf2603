//! Waymark Catalog — the validated chapter/step configuration.
//!
//! The catalog is immutable at runtime: it is loaded once at startup,
//! validated as a deploy gate, and shared read-only for the process
//! lifetime. The resolver and controller both depend on its uniqueness
//! invariants holding.

pub mod loader;
pub mod markdown;
pub mod model;
pub mod validate;

pub use loader::{CatalogLoadError, from_yaml_file, from_yaml_str};
pub use model::{
    AdvanceMode, Catalog, Chapter, ContactRole, Roster, Rosters, Step, StepConfig, StepType,
    TimeWindow,
};
pub use validate::{CatalogError, validate};
