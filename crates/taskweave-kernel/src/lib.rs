//! The taskweave kernel: the boundary between the pure replay engine and the
//! outside world.
//!
//! - [`NodeLog`]: local persistence ([`MemoryLog`], [`SqliteLog`])
//! - [`Replicator`]: transport to a relay backend ([`MemoryHub`] in-process)
//! - [`NodeSet`]: the shared, deduplicated set every read replays from
//! - [`TaskKernel`]: loads the log, originates signed nodes, ingests remote
//!   ones and reconstructs on demand
//! - [`SyncEngine`]: push/pull rounds and live feeds on tokio
//!
//! Every node that crosses a boundary is validated again on the way in.
//! Nothing here decides state; that is `taskweave-dag`'s job.

pub mod config;
pub mod db;
pub mod error;
pub mod kernel;
pub mod node_set;
pub mod replication;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::{KernelConfig, StorageConfig, SyncConfig};
pub use db::SqliteLog;
pub use error::{ConfigError, KernelError, KernelResult};
pub use kernel::{IngestOutcome, RankedEntity, TaskKernel};
pub use node_set::NodeSet;
pub use replication::{Ack, HubReplicator, MemoryHub, PullBatch, Replicator, SyncMarker};
pub use storage::{MemoryLog, NodeLog};
pub use sync::{SyncEngine, SyncRound};
