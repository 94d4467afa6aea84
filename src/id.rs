use sha2::Sha256;
use digest::Digest;
use serde::{Serialize, Deserialize};
use std::fmt;

// Domain separation tags: the same base identifier must never seed two
// different roles.
pub const TAG_PROPOSER: &[u8] = b"proposer";
pub const TAG_VALIDATOR: &[u8] = b"validator";

/// Content-derived 32-byte identifier, ordered byte-wise.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub [u8; 32]);

impl Id {
    pub fn of<T: Serialize>(entity: &T) -> Self {
        let json = serde_json::to_string(entity).expect("can't serialize value");
        Id(Sha256::digest(json.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a role-specific seed from this identifier.
    pub fn tagged(&self, tag: &[u8]) -> Id {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(tag);
        Id(hasher.finalize().into())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
