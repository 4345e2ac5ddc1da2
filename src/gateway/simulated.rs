//! The whole simulated provider: one in-memory gateway per kind.

use serde::{Deserialize, Serialize};

use crate::resource::kinds::{
    DbInstance, DbInstanceState, Function, FunctionState, HostedZone, HostedZoneState, Instance,
    InstanceState, Key, KeyState, Queue, QueueState, Table, TableState,
};

use super::MemoryGateway;

/// Every simulated gateway, one per resource kind.
#[derive(Debug, Default)]
pub struct SimulatedProvider {
    /// Queues.
    pub queues: MemoryGateway<Queue>,
    /// Compute instances.
    pub instances: MemoryGateway<Instance>,
    /// Database instances.
    pub db_instances: MemoryGateway<DbInstance>,
    /// Encryption keys.
    pub keys: MemoryGateway<Key>,
    /// Hosted zones.
    pub hosted_zones: MemoryGateway<HostedZone>,
    /// Functions.
    pub functions: MemoryGateway<Function>,
    /// Tables.
    pub tables: MemoryGateway<Table>,
}

/// Serializable copy of the simulated provider's resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSnapshot {
    /// Queues.
    #[serde(default)]
    pub queues: Vec<QueueState>,
    /// Compute instances.
    #[serde(default)]
    pub instances: Vec<InstanceState>,
    /// Database instances.
    #[serde(default)]
    pub db_instances: Vec<DbInstanceState>,
    /// Encryption keys.
    #[serde(default)]
    pub keys: Vec<KeyState>,
    /// Hosted zones.
    #[serde(default)]
    pub hosted_zones: Vec<HostedZoneState>,
    /// Functions.
    #[serde(default)]
    pub functions: Vec<FunctionState>,
    /// Tables.
    #[serde(default)]
    pub tables: Vec<TableState>,
}

impl SimulatedProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider hosting the resources in `snapshot`.
    #[must_use]
    pub fn from_snapshot(snapshot: ProviderSnapshot) -> Self {
        let provider = Self::new();
        provider.queues.import(snapshot.queues);
        provider.instances.import(snapshot.instances);
        provider.db_instances.import(snapshot.db_instances);
        provider.keys.import(snapshot.keys);
        provider.hosted_zones.import(snapshot.hosted_zones);
        provider.functions.import(snapshot.functions);
        provider.tables.import(snapshot.tables);
        provider
    }

    /// Copies every hosted resource into a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProviderSnapshot {
        ProviderSnapshot {
            queues: self.queues.export(),
            instances: self.instances.export(),
            db_instances: self.db_instances.export(),
            keys: self.keys.export(),
            hosted_zones: self.hosted_zones.export(),
            functions: self.functions.export(),
            tables: self.tables.export(),
        }
    }
}

impl ProviderSnapshot {
    /// Total number of hosted resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
            + self.instances.len()
            + self.db_instances.len()
            + self.keys.len()
            + self.hosted_zones.len()
            + self.functions.len()
            + self.tables.len()
    }

    /// Returns true if nothing is hosted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Simulated;

    #[test]
    fn test_snapshot_restores_resources() {
        let provider = SimulatedProvider::new();
        provider
            .queues
            .import([Queue::new("orders").materialize("queue-1")]);
        provider
            .tables
            .import([Table::new("sessions", "id").materialize("table-1")]);

        let snapshot = provider.snapshot();
        assert_eq!(snapshot.len(), 2);

        let restored = SimulatedProvider::from_snapshot(snapshot.clone());
        assert_eq!(restored.snapshot(), snapshot);
        assert!(restored.queues.current("orders").is_some());
    }
}
