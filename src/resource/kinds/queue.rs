//! Message queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::gateway::Simulated;
use crate::resource::{
    Diffable, Identifiable, Normalizable, ObservedState, Resource, ResourceMeta, Taggable, Tags,
    Validatable, require, require_range,
};

/// Default maximum message size in bytes (256 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 262_144;
/// Default retention period in seconds (4 days).
pub const DEFAULT_RETENTION_PERIOD: u32 = 345_600;
/// Default visibility timeout in seconds.
pub const DEFAULT_VISIBILITY_TIMEOUT: u32 = 30;

const FIFO_SUFFIX: &str = ".fifo";

/// Desired state of a message queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queue {
    /// Queue name; FIFO queues end in `.fifo`.
    pub name: String,
    /// First-in-first-out delivery.
    #[serde(default)]
    pub fifo: bool,
    /// Delivery delay in seconds (0..=900).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<u32>,
    /// Maximum message size in bytes (1024..=262144).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_message_size: Option<u32>,
    /// Retention period in seconds (60..=1209600).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_retention_period: Option<u32>,
    /// Visibility timeout in seconds (0..=43200).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_timeout: Option<u32>,
    /// Long-poll wait time in seconds (0..=20).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_wait_time_seconds: Option<u32>,
    /// Dead-letter redrive target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter: Option<DeadLetterQueue>,
    /// Shared metadata.
    #[serde(flatten)]
    pub meta: ResourceMeta,
    /// Fields reported by the provider.
    #[serde(default)]
    pub observed: QueueObserved,
}

/// Dead-letter redrive configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeadLetterQueue {
    /// ARN of the dead-letter queue.
    pub target_arn: String,
    /// Receives before a message is moved (1..=1000).
    pub max_receive_count: u32,
}

/// Provider-owned queue fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueObserved {
    /// Queue URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Queue ARN.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arn: String,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Queue as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueState {
    /// Queue URL, used as identifier.
    pub url: String,
    /// Queue name.
    pub name: String,
    /// Queue ARN.
    pub arn: String,
    /// FIFO flag.
    pub fifo: bool,
    /// Delivery delay.
    pub delay_seconds: u32,
    /// Maximum message size.
    pub maximum_message_size: u32,
    /// Retention period.
    pub message_retention_period: u32,
    /// Visibility timeout.
    pub visibility_timeout: u32,
    /// Long-poll wait time.
    pub receive_wait_time_seconds: u32,
    /// Redrive target.
    pub dead_letter: Option<DeadLetterQueue>,
    /// Applied tags.
    pub tags: Tags,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
}

/// One queue attribute update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueChange {
    /// Set the delivery delay.
    DelaySeconds(u32),
    /// Set the maximum message size.
    MaximumMessageSize(u32),
    /// Set the retention period.
    MessageRetentionPeriod(u32),
    /// Set the visibility timeout.
    VisibilityTimeout(u32),
    /// Set the long-poll wait time.
    ReceiveWaitTimeSeconds(u32),
    /// Set or clear the redrive policy.
    RedrivePolicy(Option<DeadLetterQueue>),
}

impl Queue {
    /// Creates a standard queue specification.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Normalizable for Queue {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.delay_seconds.get_or_insert(0);
        self.maximum_message_size
            .get_or_insert(DEFAULT_MAX_MESSAGE_SIZE);
        self.message_retention_period
            .get_or_insert(DEFAULT_RETENTION_PERIOD);
        self.visibility_timeout
            .get_or_insert(DEFAULT_VISIBILITY_TIMEOUT);
        self.receive_wait_time_seconds.get_or_insert(0);
    }
}

impl Validatable for Queue {
    fn validate(&self) -> Result<(), ValidationError> {
        require(Self::KIND, "name", &self.name)?;

        if self.fifo && !self.name.ends_with(FIFO_SUFFIX) {
            return Err(ValidationError::new(
                Self::KIND,
                "name",
                "FIFO queue name must end with .fifo",
            ));
        }
        if !self.fifo && self.name.ends_with(FIFO_SUFFIX) {
            return Err(ValidationError::new(
                Self::KIND,
                "fifo",
                "queue name ends with .fifo but fifo is not set",
            ));
        }

        if let Some(v) = self.delay_seconds {
            require_range(Self::KIND, "delay_seconds", v, 0, 900)?;
        }
        if let Some(v) = self.maximum_message_size {
            require_range(Self::KIND, "maximum_message_size", v, 1024, 262_144)?;
        }
        if let Some(v) = self.message_retention_period {
            require_range(Self::KIND, "message_retention_period", v, 60, 1_209_600)?;
        }
        if let Some(v) = self.visibility_timeout {
            require_range(Self::KIND, "visibility_timeout", v, 0, 43_200)?;
        }
        if let Some(v) = self.receive_wait_time_seconds {
            require_range(Self::KIND, "receive_wait_time_seconds", v, 0, 20)?;
        }

        if let Some(dlq) = &self.dead_letter {
            require(Self::KIND, "dead_letter.target_arn", &dlq.target_arn)?;
            require_range(
                Self::KIND,
                "dead_letter.max_receive_count",
                dlq.max_receive_count,
                1,
                1000,
            )?;
        }

        Ok(())
    }
}

impl Identifiable for Queue {
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

impl Diffable for Queue {
    type Current = QueueState;
    type Change = QueueChange;

    fn observe(&mut self, current: &QueueState) {
        self.observed = QueueObserved {
            url: current.url.clone(),
            arn: current.arn.clone(),
            created_at: current.created_at,
        };
    }

    fn clear_observed(&mut self) {
        self.observed = QueueObserved::default();
    }

    fn diff(&self, current: &QueueState) -> Vec<QueueChange> {
        let mut changes = Vec::new();

        if let Some(v) = self.delay_seconds.filter(|v| *v != current.delay_seconds) {
            changes.push(QueueChange::DelaySeconds(v));
        }
        if let Some(v) = self
            .maximum_message_size
            .filter(|v| *v != current.maximum_message_size)
        {
            changes.push(QueueChange::MaximumMessageSize(v));
        }
        if let Some(v) = self
            .message_retention_period
            .filter(|v| *v != current.message_retention_period)
        {
            changes.push(QueueChange::MessageRetentionPeriod(v));
        }
        if let Some(v) = self
            .visibility_timeout
            .filter(|v| *v != current.visibility_timeout)
        {
            changes.push(QueueChange::VisibilityTimeout(v));
        }
        if let Some(v) = self
            .receive_wait_time_seconds
            .filter(|v| *v != current.receive_wait_time_seconds)
        {
            changes.push(QueueChange::ReceiveWaitTimeSeconds(v));
        }
        if self.dead_letter != current.dead_letter {
            changes.push(QueueChange::RedrivePolicy(self.dead_letter.clone()));
        }

        changes
    }
}

impl Taggable for Queue {}

impl Resource for Queue {
    const KIND: &'static str = "queue";

    fn is_ready(&self) -> bool {
        !self.observed.url.is_empty()
    }
}

impl ObservedState for QueueState {
    fn identifier(&self) -> &str {
        &self.url
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl Simulated for Queue {
    const ID_PREFIX: &'static str = "queue";

    fn materialize(&self, identifier: &str) -> QueueState {
        QueueState {
            url: identifier.to_string(),
            name: self.name.clone(),
            arn: format!("arn:sim:queue:{}", self.name),
            fifo: self.fifo,
            delay_seconds: self.delay_seconds.unwrap_or(0),
            maximum_message_size: self.maximum_message_size.unwrap_or(DEFAULT_MAX_MESSAGE_SIZE),
            message_retention_period: self
                .message_retention_period
                .unwrap_or(DEFAULT_RETENTION_PERIOD),
            visibility_timeout: self.visibility_timeout.unwrap_or(DEFAULT_VISIBILITY_TIMEOUT),
            receive_wait_time_seconds: self.receive_wait_time_seconds.unwrap_or(0),
            dead_letter: self.dead_letter.clone(),
            tags: Tags::new(),
            created_at: Some(Utc::now()),
        }
    }

    fn apply(current: &mut QueueState, change: &QueueChange) {
        match change {
            QueueChange::DelaySeconds(v) => current.delay_seconds = *v,
            QueueChange::MaximumMessageSize(v) => current.maximum_message_size = *v,
            QueueChange::MessageRetentionPeriod(v) => current.message_retention_period = *v,
            QueueChange::VisibilityTimeout(v) => current.visibility_timeout = *v,
            QueueChange::ReceiveWaitTimeSeconds(v) => current.receive_wait_time_seconds = *v,
            QueueChange::RedrivePolicy(dlq) => current.dead_letter.clone_from(dlq),
        }
    }

    fn tags_mut(current: &mut QueueState) -> &mut Tags {
        &mut current.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(name: &str) -> Queue {
        let mut queue = Queue::new(name);
        queue.prepare().unwrap();
        queue
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let queue = prepared("orders");

        assert_eq!(queue.maximum_message_size, Some(DEFAULT_MAX_MESSAGE_SIZE));
        assert_eq!(queue.message_retention_period, Some(DEFAULT_RETENTION_PERIOD));
        assert_eq!(queue.visibility_timeout, Some(DEFAULT_VISIBILITY_TIMEOUT));
        assert_eq!(queue.meta.deletion_policy.as_deref(), Some("Delete"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = prepared("orders");
        let mut twice = once.clone();
        twice.normalize();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fifo_requires_suffix() {
        let mut queue = Queue {
            fifo: true,
            ..Queue::new("orders")
        };
        let err = queue.prepare().unwrap_err();
        assert_eq!(err.field, "name");

        queue.name = String::from("orders.fifo");
        assert!(queue.prepare().is_ok());
    }

    #[test]
    fn test_range_checks() {
        let mut queue = Queue {
            receive_wait_time_seconds: Some(21),
            ..Queue::new("orders")
        };
        let err = queue.prepare().unwrap_err();
        assert_eq!(err.field, "receive_wait_time_seconds");
    }

    #[test]
    fn test_stop_policy_not_allowed() {
        let mut queue = Queue::new("orders");
        queue.meta.deletion_policy = Some(String::from("Stop"));
        let err = queue.prepare().unwrap_err();
        assert_eq!(err.field, "deletion_policy");
    }

    #[test]
    fn test_diff_reports_each_field() {
        let mut queue = prepared("orders");
        let mut current = queue.materialize("queue-1");
        assert!(queue.diff(&current).is_empty());

        current.visibility_timeout = 60;
        current.delay_seconds = 5;
        queue.dead_letter = Some(DeadLetterQueue {
            target_arn: String::from("arn:sim:queue:dlq"),
            max_receive_count: 3,
        });

        let changes = queue.diff(&current);
        assert_eq!(changes.len(), 3);
        assert!(changes.contains(&QueueChange::VisibilityTimeout(DEFAULT_VISIBILITY_TIMEOUT)));
        assert!(changes.contains(&QueueChange::DelaySeconds(0)));
    }

    #[test]
    fn test_observe_and_ready() {
        let mut queue = prepared("orders");
        assert!(!queue.is_ready());

        let current = queue.materialize("queue-1");
        queue.observe(&current);
        assert!(queue.is_ready());
        assert_eq!(queue.observed.url, "queue-1");

        queue.clear_observed();
        assert!(!queue.is_ready());
    }
}
