//! Persisted form of a recorder's queue
//!
//! The snapshot is serialized as JSON and wrapped in an envelope carrying a
//! format version and a SHA-256 checksum of the payload, so a truncated or
//! bit-flipped blob is rejected instead of replayed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::error::{RecorderError, Result};
use crate::types::notification::{ChangeNotification, UNSEQUENCED};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything a recorder needs to resume after a restart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub recording_enabled: bool,
    /// Largest sequence ever stamped by this store's recorder
    pub high_water: u64,
    pub notifications: Vec<ChangeNotification>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    checksum: String,
    payload: String,
}

fn checksum(payload: &str) -> String {
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

impl QueueSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = serde_json::to_string(self)?;
        let envelope = Envelope {
            version: SNAPSHOT_VERSION,
            checksum: checksum(&payload),
            payload,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decode and validate a stored blob. Any defect is `StoreCorrupt`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| RecorderError::StoreCorrupt(format!("Unreadable envelope: {}", e)))?;

        if envelope.version != SNAPSHOT_VERSION {
            return Err(RecorderError::StoreCorrupt(format!(
                "Unsupported snapshot version {}",
                envelope.version
            )));
        }

        if checksum(&envelope.payload) != envelope.checksum {
            return Err(RecorderError::StoreCorrupt("Checksum mismatch".to_string()));
        }

        let snapshot: QueueSnapshot = serde_json::from_str(&envelope.payload)
            .map_err(|e| RecorderError::StoreCorrupt(format!("Unreadable snapshot: {}", e)))?;

        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<()> {
        let mut previous = UNSEQUENCED;
        for notification in &self.notifications {
            if notification.sequence <= previous {
                return Err(RecorderError::StoreCorrupt(format!(
                    "Sequence {} does not follow {}",
                    notification.sequence, previous
                )));
            }
            previous = notification.sequence;
        }

        if previous > self.high_water {
            return Err(RecorderError::StoreCorrupt(format!(
                "Sequence {} exceeds high-water mark {}",
                previous, self.high_water
            )));
        }

        Ok(())
    }
}
