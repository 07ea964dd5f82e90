//! Store-generated record identities.
//!
//! A [`RecordId`] is 12 bytes rendered as 24 lowercase hex characters: a
//! 4-byte big-endian timestamp (seconds since the UNIX epoch) followed by
//! 8 random bytes. Ids therefore sort roughly by creation time.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::StoreResult;

/// Length of the hex rendering of a record id.
pub const RECORD_ID_LEN: usize = 24;

/// Identity of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh id from the current time and the thread RNG.
    pub fn generate() -> Self {
        let secs = chrono::Utc::now().timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut bytes[4..]);
        Self(hex::encode(bytes))
    }

    /// Parse and validate an id received from a caller.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let trimmed = raw.trim();
        let valid = trimmed.len() == RECORD_ID_LEN
            && trimmed
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(StoreError::InvalidId { id: raw.to_string() })
        }
    }

    /// The hex string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}
