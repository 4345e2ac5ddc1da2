//! Manifest configuration.
//!
//! This module handles:
//! - Parsing and deserializing the YAML manifest
//! - Environment overrides and `.env` loading
//! - Validation and duplicate detection

mod manifest;
mod parser;
mod validator;

pub use manifest::{Defaults, EngineConfig, Manifest, ManifestResource};
pub use parser::{DEFAULT_MANIFEST_FILES, ENV_SNAPSHOT_PREFIX, ManifestParser, find_manifest_file};
pub use validator::{ManifestValidator, ValidationReport};
