// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawWorkflowDefinition, WorkflowDefinition};
use crate::errors::Result;

/// Parse a workflow definition from TOML text.
///
/// This only performs deserialization; it does **not** validate the graph.
/// The result is what a `DRAFT` workflow holds.
pub fn from_toml_str(contents: &str) -> Result<RawWorkflowDefinition> {
    let definition: RawWorkflowDefinition = toml::from_str(contents)?;
    Ok(definition)
}

/// Serialize a (possibly still draft) definition back to TOML.
pub fn to_toml_string(definition: &RawWorkflowDefinition) -> Result<String> {
    Ok(toml::to_string(definition)?)
}

/// Load a workflow definition file without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowDefinition> {
    let contents = fs::read_to_string(path.as_ref())?;
    from_toml_str(&contents)
}

/// Load a workflow definition file and run full validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks required fields, unknown dependencies, cycles, conditions,
///   durations and compensation references.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
    let raw = load_from_path(path)?;
    Ok(WorkflowDefinition::try_from(raw)?)
}
