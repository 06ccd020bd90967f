//! CDC enable/disable: mirrored between the table's `Metadata`
//! configuration (`delta.enableChangeDataFeed`) and a side file,
//! `_cdc_config.json`, so a table-scoped reader doesn't have to replay the
//! log just to know whether to expect change files.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::CdcError;
use crate::storage::error::StorageError;
use crate::storage::Storage;

pub const CONFIG_KEY: &str = "delta.enableChangeDataFeed";
const CONFIG_FILE: &str = "_cdc_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CdcConfig {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "retentionMs")]
    pub retention_ms: Option<u64>,
}

impl Default for CdcConfig {
    fn default() -> Self {
        Self { enabled: false, retention_ms: None }
    }
}

fn config_path(base_dir: &str) -> String {
    format!("{}/{CONFIG_FILE}", base_dir.trim_end_matches('/'))
}

pub async fn read_cdc_config(storage: &dyn Storage, base_dir: &str) -> Result<CdcConfig, CdcError> {
    match storage.read(&config_path(base_dir)).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)
            .map_err(|e| CdcError::Parse { path: config_path(base_dir), reason: e.to_string() })?),
        Err(StorageError::FileNotFound(_)) => Ok(CdcConfig::default()),
        Err(e) => Err(e.into()),
    }
}

pub async fn write_cdc_config(storage: &dyn Storage, base_dir: &str, config: &CdcConfig) -> Result<(), CdcError> {
    let bytes = Bytes::from(serde_json::to_vec(config).expect("CdcConfig always serializes"));
    storage.write(&config_path(base_dir), bytes).await?;
    Ok(())
}
