//! YAML catalog loading.
//!
//! Loading always validates; a catalog that fails validation never reaches
//! the engine.

use std::path::Path;

use thiserror::Error;

use crate::model::Catalog;
use crate::validate::{CatalogError, validate};

/// Errors raised while loading a catalog file.
#[derive(Debug, Error)]
pub enum CatalogLoadError {
    /// The file could not be read.
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    /// The YAML did not parse into the catalog model.
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The parsed catalog violates an invariant.
    #[error(transparent)]
    Invalid(#[from] CatalogError),
}

/// Parses and validates a catalog from a YAML string.
///
/// # Errors
///
/// Returns `CatalogLoadError` on parse or validation failure.
pub fn from_yaml_str(yaml: &str) -> Result<Catalog, CatalogLoadError> {
    let catalog: Catalog = serde_yaml::from_str(yaml)?;
    validate(&catalog)?;
    Ok(catalog)
}

/// Reads, parses, and validates a catalog file.
///
/// # Errors
///
/// Returns `CatalogLoadError` on I/O, parse, or validation failure.
pub fn from_yaml_file(path: &Path) -> Result<Catalog, CatalogLoadError> {
    let yaml = std::fs::read_to_string(path)?;
    from_yaml_str(&yaml)
}
