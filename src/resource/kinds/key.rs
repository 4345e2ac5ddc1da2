//! Encryption key.
//!
//! Keys are retained on delete unless the caller says otherwise.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::gateway::Simulated;
use crate::resource::{
    DeletionPolicy, Diffable, Identifiable, Normalizable, ObservedState, Resource, ResourceMeta,
    Taggable, Tags, Validatable, require, require_range,
};

/// Default pending window before a scheduled deletion completes, in days.
pub const DEFAULT_PENDING_WINDOW_DAYS: u32 = 30;

const ALIAS_PREFIX: &str = "alias/";

/// Desired state of an encryption key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Key {
    /// Key alias; `alias/` is prepended when missing.
    pub alias: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Cryptographic usage.
    #[serde(default)]
    pub key_usage: KeyUsage,
    /// Key material type.
    #[serde(default)]
    pub key_spec: KeySpec,
    /// Whether the key can be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Automatic yearly rotation; symmetric keys only.
    #[serde(default)]
    pub enable_key_rotation: bool,
    /// Days before a scheduled deletion completes (7..=30).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_window_in_days: Option<u32>,
    /// Shared metadata.
    #[serde(flatten)]
    pub meta: ResourceMeta,
    /// Fields reported by the provider.
    #[serde(default)]
    pub observed: KeyObserved,
}

/// Cryptographic usage of a key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyUsage {
    /// Encrypt and decrypt.
    #[default]
    EncryptDecrypt,
    /// Sign and verify.
    SignVerify,
}

/// Key material type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum KeySpec {
    /// 256-bit symmetric key.
    #[default]
    #[serde(rename = "SYMMETRIC_DEFAULT")]
    SymmetricDefault,
    /// RSA 2048.
    #[serde(rename = "RSA_2048")]
    Rsa2048,
    /// RSA 4096.
    #[serde(rename = "RSA_4096")]
    Rsa4096,
    /// ECC P-256.
    #[serde(rename = "ECC_NIST_P256")]
    EccNistP256,
}

/// Provider-owned key fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyObserved {
    /// Key ARN.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arn: String,
    /// Key state (e.g. "Enabled").
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_state: String,
}

/// Key as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyState {
    /// Key id, used as identifier.
    pub key_id: String,
    /// Alias.
    pub alias: String,
    /// Key ARN.
    pub arn: String,
    /// Description.
    pub description: String,
    /// Key material type.
    pub key_spec: KeySpec,
    /// Usable.
    pub enabled: bool,
    /// Automatic rotation.
    pub rotation_enabled: bool,
    /// Applied tags.
    pub tags: Tags,
}

/// One key update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChange {
    /// Update the description.
    Description(String),
    /// Enable or disable the key.
    Enabled(bool),
    /// Enable or disable rotation.
    Rotation(bool),
}

impl KeySpec {
    /// Returns true for symmetric key material.
    #[must_use]
    pub const fn is_symmetric(self) -> bool {
        matches!(self, Self::SymmetricDefault)
    }
}

impl Normalizable for Key {
    fn normalize(&mut self) {
        let alias = self.alias.trim();
        if !alias.is_empty() && !alias.starts_with(ALIAS_PREFIX) {
            self.alias = format!("{ALIAS_PREFIX}{alias}");
        } else {
            self.alias = alias.to_string();
        }
        self.enabled.get_or_insert(true);
        self.pending_window_in_days
            .get_or_insert(DEFAULT_PENDING_WINDOW_DAYS);
    }
}

impl Validatable for Key {
    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "alias", &self.alias)?;

        if let Some(days) = self.pending_window_in_days {
            require_range(Self::KIND, "pending_window_in_days", days, 7, 30)?;
        }

        if self.enable_key_rotation && !self.key_spec.is_symmetric() {
            return Err(ValidationError::new(
                Self::KIND,
                "enable_key_rotation",
                "rotation is only supported for symmetric keys",
            ));
        }

        if self.key_usage == KeyUsage::SignVerify && self.key_spec.is_symmetric() {
            return Err(ValidationError::new(
                Self::KIND,
                "key_usage",
                "symmetric keys cannot sign",
            ));
        }

        Ok(())
    }
}

impl Identifiable for Key {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }

    fn natural_key(&self) -> &str {
        &self.alias
    }
}

impl Diffable for Key {
    type Current = KeyState;
    type Change = KeyChange;

    fn observe(&mut self, current: &KeyState) {
        self.observed = KeyObserved {
            arn: current.arn.clone(),
            key_state: String::from(if current.enabled { "Enabled" } else { "Disabled" }),
        };
    }

    fn clear_observed(&mut self) {
        self.observed = KeyObserved::default();
    }

    fn diff(&self, current: &KeyState) -> Vec<KeyChange> {
        let mut changes = Vec::new();
        if self.description != current.description {
            changes.push(KeyChange::Description(self.description.clone()));
        }
        if let Some(enabled) = self.enabled.filter(|e| *e != current.enabled) {
            changes.push(KeyChange::Enabled(enabled));
        }
        if self.key_spec.is_symmetric() && self.enable_key_rotation != current.rotation_enabled {
            changes.push(KeyChange::Rotation(self.enable_key_rotation));
        }
        changes
    }

    fn post_create(&self) -> Vec<KeyChange> {
        if self.enable_key_rotation {
            vec![KeyChange::Rotation(true)]
        } else {
            Vec::new()
        }
    }
}

impl Taggable for Key {}

impl Resource for Key {
    const KIND: &'static str = "key";

    const DEFAULT_POLICY: DeletionPolicy = DeletionPolicy::Retain;

    fn is_ready(&self) -> bool {
        self.observed.key_state == "Enabled"
    }
}

impl ObservedState for KeyState {
    fn identifier(&self) -> &str {
        &self.key_id
    }

    fn name(&self) -> &str {
        &self.alias
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Simulated for Key {
    const ID_PREFIX: &'static str = "key";

    fn materialize(&self, identifier: &str) -> KeyState {
        KeyState {
            key_id: identifier.to_string(),
            alias: self.alias.clone(),
            arn: format!("arn:sim:key:{identifier}"),
            description: self.description.clone(),
            key_spec: self.key_spec,
            enabled: self.enabled.unwrap_or(true),
            rotation_enabled: false,
            tags: Tags::new(),
        }
    }

    fn apply(current: &mut KeyState, change: &KeyChange) {
        match change {
            KeyChange::Description(d) => current.description.clone_from(d),
            KeyChange::Enabled(e) => current.enabled = *e,
            KeyChange::Rotation(r) => current.rotation_enabled = *r,
        }
    }

    fn tags_mut(current: &mut KeyState) -> &mut Tags {
        &mut current.tags
    }
}
