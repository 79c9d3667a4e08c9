//! Migration System
//!
//! Leaf accessors (script directory, ledger), the execution engines, and the
//! orchestration built on top of them (status reconciliation, reordering).

pub mod definitions;
pub mod ledger;
pub mod manager;
pub mod migrator;
pub mod reorder;
pub mod runner;
pub mod snapshot;
pub mod status;
pub mod version;

pub use definitions::*;
pub use ledger::{FileLedger, MemoryLedger, PgLedger, VersionLedger};
pub use manager::ScriptDirectory;
pub use migrator::Migrator;
pub use reorder::ReorderEngine;
pub use runner::{ExecutionEngine, LedgerOnlyRunner, PgRunner};
pub use snapshot::{SchemaDumper, SchemaSnapshot, SnapshotDumper};
pub use status::{orphaned_versions, reconcile};
pub use version::Version;
