//! Change data capture: version-aligned insert/update/delete records
//! persisted alongside a table's main data, read back by version or
//! timestamp range, or streamed to subscribers in commit order.

pub mod config;
pub mod error;
pub mod reader;
pub mod record;
pub mod subscribe;
pub mod writer;

pub use config::{read_cdc_config, write_cdc_config, CdcConfig};
pub use error::{CdcError, CdcErrorCode};
pub use reader::{read_by_timestamp, read_by_version};
pub use record::{ChangeRecord, ChangeType};
pub use subscribe::CdcDispatcher;
pub use writer::write_cdc_file;
