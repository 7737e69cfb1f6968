//! Configuration for the CEGAR loop.

use arnn_core::{ArnnError, Result};
use arnn_propagate::PropertyUpdateMethod;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for [`crate::Cegar`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CegarConfig {
    /// After a spurious example, keep refining until every spurious example
    /// found so far stops satisfying the property, instead of applying a
    /// single policy round.
    pub refine_until_not_satisfying: bool,
    /// Recompute the property for each abstract network before querying.
    pub update_property: Option<PropertyUpdateMethod>,
    /// Split neurons by sign and scaling before abstracting. Disable only for
    /// networks that are already classified.
    pub preprocess: bool,
    /// Stop after this many oracle queries.
    pub max_iterations: Option<usize>,
}

impl Default for CegarConfig {
    fn default() -> Self {
        Self {
            refine_until_not_satisfying: false,
            update_property: None,
            preprocess: true,
            max_iterations: None,
        }
    }
}

impl CegarConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ArnnError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ArnnError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}
