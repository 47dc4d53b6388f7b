//! Canary records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::driver::CanaryRow;

const PAYLOAD_LEN: usize = 32;
const FIELD_SEPARATOR: u8 = 0x1F;

/// A uniquely identified record written to the primary and looked up on
/// replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanaryRecord {
    pub id: String,
    pub payload: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl CanaryRecord {
    /// Fresh canary with a random id and payload.
    pub fn generate() -> Self {
        let id = format!("canary-{}", Uuid::new_v4().simple());
        let payload: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(PAYLOAD_LEN)
            .collect();
        Self::new(id, payload)
    }

    pub fn new(id: String, payload: String) -> Self {
        let checksum = checksum(&id, &payload);
        Self {
            id,
            payload,
            checksum,
            created_at: Utc::now(),
        }
    }

    pub fn to_row(&self) -> CanaryRow {
        CanaryRow {
            id: self.id.clone(),
            payload: self.payload.clone(),
            checksum: self.checksum.clone(),
            created_at: self.created_at,
        }
    }
}

/// Hex SHA-256 over `id ‖ 0x1F ‖ payload`.
pub fn checksum(id: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a stored row matches the canary that was written.
///
/// Both the payload and the checksum recomputed from `(id, expected payload)`
/// must match. A missing row is inconsistent.
pub fn verify(expected: &CanaryRecord, stored: Option<&CanaryRow>) -> bool {
    let Some(row) = stored else {
        return false;
    };
    row.payload == expected.payload && row.checksum == checksum(&expected.id, &expected.payload)
}
