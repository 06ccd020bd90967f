//! Transaction log: the append-only, version-numbered sequence of
//! actions under `_delta_log/` that is the table's single source of truth.

pub mod action;
pub mod commit;
pub mod error;

pub use action::{Action, AddAction, CommitInfoAction, MetadataAction, ProtocolAction, RemoveAction};
pub use commit::{commit_with_retry, latest_version, read_commit, CommitResult};
pub use error::LogError;
