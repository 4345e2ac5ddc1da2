//! Manifest parser for loading resource manifests.
//!
//! This module handles loading manifests from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ManifestError, ReconcilerError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::manifest::Manifest;

/// Environment variable overriding the snapshot prefix.
pub const ENV_SNAPSHOT_PREFIX: &str = "INFRA_RECONCILE_SNAPSHOT_PREFIX";

/// Manifest parser.
#[derive(Debug, Default)]
pub struct ManifestParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ManifestParser {
    /// Creates a new manifest parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory searched for `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(ReconcilerError::Manifest(ManifestError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ReconcilerError::Manifest(ManifestError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Manifest> {
        debug!("Parsing YAML manifest");

        let manifest: Manifest = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ReconcilerError::Manifest(ManifestError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed manifest with {} resource(s)", manifest.resources.len());
        Ok(manifest)
    }

    /// Loads a manifest, then applies environment overrides and defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let mut manifest = self.load_file(path)?;

        Self::apply_env_overrides(&mut manifest);
        manifest.apply_defaults();

        Ok(manifest)
    }

    /// Applies environment variable overrides to the manifest.
    fn apply_env_overrides(manifest: &mut Manifest) {
        if let Ok(prefix) = std::env::var(ENV_SNAPSHOT_PREFIX)
            && !prefix.trim().is_empty()
        {
            debug!("Overriding engine.snapshot_prefix from environment");
            manifest.engine.snapshot_prefix = prefix;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ReconcilerError::Manifest(ManifestError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default manifest file names to search for.
pub const DEFAULT_MANIFEST_FILES: &[&str] = &["infra.yaml", "infra.yml", "manifest.yaml"];

/// Finds the manifest in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_manifest_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_MANIFEST_FILES {
            let candidate = current.join(filename);
            if candidate.exists() {
                info!("Found manifest: {}", candidate.display());
                return Ok(candidate);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ReconcilerError::Manifest(ManifestError::FileNotFound {
        path: start.join(DEFAULT_MANIFEST_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_manifest() {
        let parser = ManifestParser::new();
        let manifest = parser.parse_yaml("resources: []\n", None).unwrap();
        assert!(manifest.resources.is_empty());
    }

    #[test]
    fn test_parse_error_carries_location() {
        let parser = ManifestParser::new();
        let err = parser
            .parse_yaml("resources: [", Some(Path::new("infra.yaml")))
            .unwrap_err();

        match err {
            ReconcilerError::Manifest(ManifestError::ParseError { location, .. }) => {
                assert_eq!(location.as_deref(), Some("infra.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ManifestParser::new()
            .load_file(dir.path().join("nope.yaml"))
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcilerError::Manifest(ManifestError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_applies_default_tags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("infra.yaml");
        fs::write(
            &path,
            "defaults:\n  tags:\n    owner: platform\nresources:\n  - kind: queue\n    name: orders\n",
        )
        .unwrap();

        let manifest = ManifestParser::new().load_with_env(&path).unwrap();
        let tags = &manifest.resources[0].meta().tags;
        assert_eq!(tags.get("owner").map(String::as_str), Some("platform"));
    }

    #[test]
    fn test_find_manifest_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("infra.yml"), "resources: []\n").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = find_manifest_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("infra.yml"));
    }
}
