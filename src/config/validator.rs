//! Manifest validation.
//!
//! Normalizes and validates every resource before any provider call, and
//! rejects manifests that declare the same resource twice.

use crate::error::{ManifestError, ReconcilerError, Result, ValidationError};
use crate::resource::DeletionPolicy;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::manifest::Manifest;

/// Validator for resource manifests.
#[derive(Debug, Default)]
pub struct ManifestValidator {
    /// Warn about resources without any tags.
    warn_untagged: bool,
}

/// Outcome of a successful validation.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Number of resources validated.
    pub resources: usize,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
}

impl ManifestValidator {
    /// Creates a validator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            warn_untagged: true,
        }
    }

    /// Disables the untagged-resource warning.
    #[must_use]
    pub const fn allow_untagged(mut self) -> Self {
        self.warn_untagged = false;
        self
    }

    /// Normalizes and validates every resource in place.
    ///
    /// # Errors
    ///
    /// Returns a manifest error for duplicates or for any invalid resource;
    /// the error names the first failure and counts them all.
    pub fn validate(&self, manifest: &mut Manifest) -> Result<ValidationReport> {
        let mut report = ValidationReport {
            resources: manifest.resources.len(),
            ..ValidationReport::default()
        };
        let mut failures: Vec<ValidationError> = Vec::new();

        for resource in &mut manifest.resources {
            if let Err(e) = resource.prepare() {
                debug!("Invalid {} '{}': {e}", resource.kind(), resource.name());
                failures.push(e);
            }
        }

        let mut seen = HashSet::new();
        for resource in &manifest.resources {
            if !seen.insert((resource.kind(), resource.name().to_string())) {
                return Err(ReconcilerError::Manifest(ManifestError::DuplicateName {
                    kind: resource.kind().to_string(),
                    name: resource.name().to_string(),
                }));
            }
        }

        if let Some(first) = failures.first() {
            return Err(ReconcilerError::Manifest(ManifestError::Invalid {
                count: failures.len(),
                first: first.clone(),
            }));
        }

        for resource in &manifest.resources {
            let meta = resource.meta();
            let label = format!("{} '{}'", resource.kind(), resource.name());

            if self.warn_untagged && meta.tags.is_empty() {
                report.warnings.push(format!("{label} has no tags"));
            }

            let policy = meta
                .deletion_policy
                .as_deref()
                .and_then(|p| p.parse::<DeletionPolicy>().ok());
            match policy {
                Some(DeletionPolicy::Orphan) => report
                    .warnings
                    .push(format!("{label} will be orphaned on delete")),
                Some(DeletionPolicy::Snapshot) if meta.final_snapshot_id.is_none() => {
                    report
                        .warnings
                        .push(format!("{label} will get a generated final snapshot name"));
                }
                _ => {}
            }
        }

        for warning in &report.warnings {
            warn!("{warning}");
        }
        debug!("Manifest validation passed for {} resource(s)", report.resources);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManifestResource;
    use crate::resource::kinds::{HostedZone, Queue};

    fn manifest(resources: Vec<ManifestResource>) -> Manifest {
        Manifest {
            resources,
            ..Manifest::default()
        }
    }

    #[test]
    fn test_valid_manifest_is_normalized() {
        let mut m = manifest(vec![ManifestResource::Queue(Queue::new("orders"))]);

        let report = ManifestValidator::new().validate(&mut m).unwrap();

        assert_eq!(report.resources, 1);
        assert_eq!(report.warnings, vec![String::from("queue 'orders' has no tags")]);
        assert_eq!(m.resources[0].meta().deletion_policy.as_deref(), Some("Delete"));
    }

    #[test]
    fn test_duplicates_detected_after_normalization() {
        let zone = |name: &str| {
            ManifestResource::HostedZone(HostedZone {
                name: name.to_string(),
                ..HostedZone::default()
            })
        };
        let mut m = manifest(vec![zone("example.com"), zone("Example.com.")]);

        let err = ManifestValidator::new().validate(&mut m).unwrap_err();
        assert!(matches!(
            err,
            ReconcilerError::Manifest(ManifestError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_all_failures_counted() {
        let mut m = manifest(vec![
            ManifestResource::Queue(Queue::new("")),
            ManifestResource::Queue(Queue::new("ok")),
            ManifestResource::Queue(Queue {
                delay_seconds: Some(9000),
                ..Queue::new("slow")
            }),
        ]);

        let err = ManifestValidator::new()
            .allow_untagged()
            .validate(&mut m)
            .unwrap_err();
        match err {
            ReconcilerError::Manifest(ManifestError::Invalid { count, first }) => {
                assert_eq!(count, 2);
                assert_eq!(first.field, "name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
