use ed25519_dalek::{self, Verifier, Signer};
use rand::rngs::OsRng;
use sha2::{Sha256, Digest};
use serde::{Serialize, Deserialize};

use crate::id::Id;

pub type PublicKey = ed25519_dalek::PublicKey;
pub type SecretKey = ed25519_dalek::SecretKey;
pub type Signature = ed25519_dalek::Signature;

const GENESIS_SEED: [u8; 32] = [
    41, 18, 202, 7, 120, 55, 91, 180,
    230, 14, 163, 96, 33, 205, 72, 149,
    8, 112, 59, 176, 24, 251, 87, 133,
    66, 190, 101, 28, 240, 173, 45, 219
];

/// One participant as seen at a specific snapshot. Never mutated in
/// place; a changed account is a new value in a later snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: Id,
    pub pk: PublicKey,
    pub stake: u32,
    pub last_block: Id,
}

impl Account {
    pub fn new(pk: PublicKey, stake: u32, last_block: Id) -> Self {
        Self { id: address(&pk), pk, stake, last_block }
    }
}

/// Account identifier: hash of the public key bytes.
pub fn address(pk: &PublicKey) -> Id {
    Id(Sha256::digest(pk.as_bytes()).into())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Keypair {
    pub kp: ed25519_dalek::Keypair,
}

impl Default for Keypair {
    fn default() -> Self {
        Self::from_seed(GENESIS_SEED)
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        // the secret bytes are the seed; the public key re-derives
        Self::from_seed(self.kp.secret.to_bytes())
    }
}

impl Keypair {
    pub fn gen() -> Self {
        let mut csprng = OsRng {};
        Self { kp: ed25519_dalek::Keypair::generate(&mut csprng) }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = SecretKey::from_bytes(&seed).expect("seed is 32 bytes");
        let public = PublicKey::from(&secret);
        Self { kp: ed25519_dalek::Keypair { secret, public } }
    }

    pub fn public(&self) -> PublicKey {
        self.kp.public
    }

    pub fn id(&self) -> Id {
        address(&self.kp.public)
    }

    pub fn sign<T: Serialize>(&self, msg: &T) -> Signature {
        let json = serde_json::to_string(msg).expect("can't serialize value");
        self.kp.sign(json.as_bytes())
    }
}

/// Check `sig` over the canonical bytes of `msg` under `pk`.
pub fn verify<T: Serialize>(pk: &PublicKey, msg: &T, sig: &Signature) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(_) => return false,
    };
    pk.verify(json.as_bytes(), sig).is_ok()
}
