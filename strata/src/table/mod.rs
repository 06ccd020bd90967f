//! The table engine: the public surface that ties storage, codec,
//! filter pushdown, the transaction log, checkpoints, snapshots, CDC, and
//! maintenance together into `write` / `query` / `update` / `delete` /
//! `merge` / `history` / `describe`.

pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod recovery;

pub use config::TableConfig;
pub use engine::{CommitSummary, MergeOutcome, MetadataPatch, Table, WriteOptions};
pub use error::TableError;
pub use query::{Projection, QueryOptions, QueryResult, TableSummary};
