//! Serverless function.
//!
//! Functions converge their tags exactly: tags present on the provider but
//! not declared are removed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::gateway::Simulated;
use crate::reconciler::TagStrategy;
use crate::resource::{
    Diffable, Identifiable, Normalizable, ObservedState, Resource, ResourceMeta, Taggable, Tags,
    Validatable, require, require_range,
};

/// Default timeout in seconds.
pub const DEFAULT_TIMEOUT: u32 = 3;
/// Default memory in MiB.
pub const DEFAULT_MEMORY_SIZE: u32 = 128;

const STATE_ACTIVE: &str = "Active";

/// Desired state of a function.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Runtime (e.g. "python3.12"); not needed for image packages.
    #[serde(default)]
    pub runtime: String,
    /// Entry point; not needed for image packages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    /// Execution role.
    pub role: String,
    /// Deployment package.
    pub code: FunctionCode,
    /// Timeout in seconds (1..=900).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    /// Memory in MiB (128..=10240).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Shared metadata.
    #[serde(flatten)]
    pub meta: ResourceMeta,
    /// Fields reported by the provider.
    #[serde(default)]
    pub observed: FunctionObserved,
}

/// Deployment package source. Exactly one of inline, object or image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCode {
    /// Inline archive, base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_file: Option<String>,
    /// Object store bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<String>,
    /// Object key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    /// Container image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
}

/// Provider-owned function fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionObserved {
    /// Function ARN.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arn: String,
    /// Lifecycle state.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    /// Digest of the deployed package.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code_sha256: String,
    /// Published version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Function as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionState {
    /// Function ARN, used as identifier.
    pub arn: String,
    /// Function name.
    pub name: String,
    /// Runtime.
    pub runtime: String,
    /// Entry point.
    pub handler: Option<String>,
    /// Timeout.
    pub timeout: u32,
    /// Memory.
    pub memory_size: u32,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
    /// Source digest of the deployed package.
    ///
    /// Gateways must report the [`FunctionCode::sha256`] of the source they
    /// last deployed, not a digest of the archive bytes. Code drift is
    /// detected by comparing it with the desired source.
    pub code_sha256: String,
    /// Lifecycle state.
    pub state: String,
    /// Published version.
    pub version: String,
    /// Applied tags.
    pub tags: Tags,
}

/// One function update. Code and configuration are updated separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionChange {
    /// Deploy a new package.
    Code(FunctionCode),
    /// Change the timeout.
    Timeout(u32),
    /// Change the memory size.
    MemorySize(u32),
    /// Replace the environment.
    Environment(BTreeMap<String, String>),
    /// Change the entry point.
    Handler(String),
    /// Change the runtime.
    Runtime(String),
}

impl FunctionCode {
    /// Returns true for container image packages.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        self.image_uri.is_some()
    }

    /// Digest identifying the package source.
    #[must_use]
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.zip_file, &self.s3_bucket, &self.s3_key, &self.image_uri] {
            hasher.update(part.as_deref().unwrap_or_default().as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

impl Normalizable for Function {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.timeout.get_or_insert(DEFAULT_TIMEOUT);
        self.memory_size.get_or_insert(DEFAULT_MEMORY_SIZE);
    }
}

impl Validatable for Function {
    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "name", &self.name)?;
        require(Self::KIND, "role", &self.role)?;

        let sources = [
            self.code.zip_file.is_some(),
            self.code.s3_bucket.is_some(),
            self.code.image_uri.is_some(),
        ];
        match sources.iter().filter(|s| **s).count() {
            0 => {
                return Err(ValidationError::new(
                    Self::KIND,
                    "code",
                    "one of zip_file, s3_bucket or image_uri is required",
                ));
            }
            1 => {}
            _ => {
                return Err(ValidationError::new(
                    Self::KIND,
                    "code",
                    "only one code source may be set",
                ));
            }
        }
        if self.code.s3_bucket.is_some() && self.code.s3_key.is_none() {
            return Err(ValidationError::new(
                Self::KIND,
                "code.s3_key",
                "s3_key is required with s3_bucket",
            ));
        }

        if !self.code.is_image() {
            require(Self::KIND, "runtime", &self.runtime)?;
            require(Self::KIND, "handler", self.handler.as_deref().unwrap_or_default())?;
        }

        if let Some(timeout) = self.timeout {
            require_range(Self::KIND, "timeout", timeout, 1, 900)?;
        }
        if let Some(memory) = self.memory_size {
            require_range(Self::KIND, "memory_size", memory, 128, 10_240)?;
        }

        Ok(())
    }
}

impl Identifiable for Function {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

impl Diffable for Function {
    type Current = FunctionState;
    type Change = FunctionChange;

    fn observe(&mut self, current: &FunctionState) {
        self.observed = FunctionObserved {
            arn: current.arn.clone(),
            state: current.state.clone(),
            code_sha256: current.code_sha256.clone(),
            version: current.version.clone(),
        };
    }

    fn clear_observed(&mut self) {
        self.observed = FunctionObserved::default();
    }

    fn diff(&self, current: &FunctionState) -> Vec<FunctionChange> {
        let mut changes = Vec::new();

        if self.code.sha256() != current.code_sha256 {
            changes.push(FunctionChange::Code(self.code.clone()));
        }
        if let Some(t) = self.timeout.filter(|t| *t != current.timeout) {
            changes.push(FunctionChange::Timeout(t));
        }
        if let Some(m) = self.memory_size.filter(|m| *m != current.memory_size) {
            changes.push(FunctionChange::MemorySize(m));
        }
        if self.environment != current.environment {
            changes.push(FunctionChange::Environment(self.environment.clone()));
        }
        if let Some(h) = self.handler.as_ref().filter(|h| current.handler.as_ref() != Some(*h)) {
            changes.push(FunctionChange::Handler(h.clone()));
        }
        if !self.runtime.is_empty() && self.runtime != current.runtime {
            changes.push(FunctionChange::Runtime(self.runtime.clone()));
        }

        changes
    }
}

impl Taggable for Function {
    const TAG_STRATEGY: TagStrategy = TagStrategy::AdditiveWithRemoval;
}

impl Resource for Function {
    const KIND: &'static str = "function";

    fn is_ready(&self) -> bool {
        self.observed.state == STATE_ACTIVE
    }
}

impl ObservedState for FunctionState {
    fn identifier(&self) -> &str {
        &self.arn
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Simulated for Function {
    const ID_PREFIX: &'static str = "fn";

    fn materialize(&self, identifier: &str) -> FunctionState {
        FunctionState {
            arn: identifier.to_string(),
            name: self.name.clone(),
            runtime: self.runtime.clone(),
            handler: self.handler.clone(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            memory_size: self.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE),
            environment: self.environment.clone(),
            code_sha256: self.code.sha256(),
            state: String::from(STATE_ACTIVE),
            version: String::from("$LATEST"),
            tags: Tags::new(),
        }
    }

    fn apply(current: &mut FunctionState, change: &FunctionChange) {
        match change {
            FunctionChange::Code(code) => current.code_sha256 = code.sha256(),
            FunctionChange::Timeout(t) => current.timeout = *t,
            FunctionChange::MemorySize(m) => current.memory_size = *m,
            FunctionChange::Environment(env) => current.environment.clone_from(env),
            FunctionChange::Handler(h) => current.handler = Some(h.clone()),
            FunctionChange::Runtime(r) => current.runtime.clone_from(r),
        }
    }

    fn tags_mut(current: &mut FunctionState) -> &mut Tags {
        &mut current.tags
    }
}
