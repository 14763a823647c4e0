//! Task identities — opaque, unguessable capability tokens.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes behind each identity (128 bits).
const ID_BYTES: usize = 16;

/// Opaque task identity: 128 bits from the OS-seeded CSPRNG, hex encoded.
///
/// Any string can be wrapped (path segments arrive as plain strings); an id
/// that was never issued is simply unknown to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
