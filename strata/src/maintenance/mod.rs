//! Table maintenance: small-file compaction, row dedup, Z-order
//! clustering, and tombstone vacuum. None of these change a table's logical
//! contents — compaction and vacuum are pure housekeeping over files already
//! committed, so every action they produce is `dataChange=false` and every
//! deletion is gated on tombstone age.

pub mod compaction;
pub mod dedup;
pub mod error;
pub mod vacuum;
pub mod zorder;

pub use compaction::{execute_compaction, plan_compaction};
pub use dedup::{dedup_rows, KeepStrategy};
pub use error::MaintenanceError;
pub use vacuum::{vacuum, DEFAULT_RETENTION_MILLIS};
pub use zorder::{morton_code, to_ordinal, z_order_key};
