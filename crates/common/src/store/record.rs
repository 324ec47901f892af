//! On-disk layout of the state file.
//!
//! ```text
//! { "_meta": { "key": { "iv": b64, "tag": b64, "data": b64 } },
//!   "payload": b64(iv || tag || ciphertext) }
//! ```
//!
//! The wrapped key keeps its parts as separate fields while the payload is a
//! single concatenated blob. Both encodings are part of the file format.

use serde::{Deserialize, Serialize};

use super::error::{Result, StoreError};
use crate::crypto::WrappedKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub key: WrappedKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableRecord {
    #[serde(rename = "_meta")]
    pub meta: RecordMeta,
    pub payload: String,
}

impl DurableRecord {
    pub fn new(key: WrappedKey, payload: String) -> Self {
        Self {
            meta: RecordMeta { key },
            payload,
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| StoreError::Format(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
