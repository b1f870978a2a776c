// src/config/mod.rs

//! Workflow definitions.
//!
//! Responsibilities:
//! - Define the serde-backed definition model (`model.rs`).
//! - Read and write definitions as TOML (`loader.rs`).
//! - Validate a draft into a frozen [`WorkflowDefinition`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{from_toml_str, load_and_validate, load_from_path, to_toml_string};
pub use model::{CompiledTask, RawWorkflowDefinition, TaskSpec, WorkflowDefinition};
pub use validate::validate_definition;
