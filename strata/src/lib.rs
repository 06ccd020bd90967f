//! A client-side transactional table format over object storage: ACID
//! writes via optimistic concurrency, time travel through a versioned
//! transaction log, change data capture, and small-file compaction —
//! the same shape Delta Lake gives a Spark cluster, built instead as an
//! embeddable library with no coordination service of its own.
//!
//! The module layout mirrors the system's own layering: [`storage`] is the
//! only thing that talks to a byte store, [`codec`] turns rows into Parquet
//! bytes and back, [`filter`] decides what a query can skip without reading
//! it, [`log`] and [`checkpoint`] are the transaction log and its periodic
//! collapse, [`snapshot`] replays both into a point-in-time view, [`table`]
//! is the public engine built on top of all of it, and [`cdc`] /
//! [`maintenance`] are the two satellite concerns (change feeds, file
//! housekeeping) that ride along with a commit without being part of its
//! correctness.

pub mod cdc;
pub mod checkpoint;
pub mod codec;
pub mod error;
pub mod filter;
pub mod log;
pub mod logging;
pub mod maintenance;
pub mod retry;
pub mod row;
pub mod snapshot;
pub mod storage;
pub mod table;

pub use error::Error;
pub use row::{DataType, Row, Schema, SchemaField, Value};
pub use table::{Table, TableConfig, TableError};
