//! Concrete resource kinds.
//!
//! Each kind supplies its own defaults, validation, natural key, allowed
//! deletion policies, tag strategy and mutable-field diff.

pub mod db_instance;
pub mod function;
pub mod hosted_zone;
pub mod instance;
pub mod key;
pub mod queue;
pub mod table;

pub use db_instance::{DbEngine, DbInstance, DbInstanceChange, DbInstanceState};
pub use function::{Function, FunctionChange, FunctionCode, FunctionState};
pub use hosted_zone::{HostedZone, HostedZoneChange, HostedZoneState};
pub use instance::{Instance, InstanceChange, InstanceState, InstanceStatus};
pub use key::{Key, KeyChange, KeySpec, KeyState, KeyUsage};
pub use queue::{DeadLetterQueue, Queue, QueueChange, QueueState};
pub use table::{AttributeType, BillingMode, KeyAttribute, Table, TableChange, TableState, Throughput};
