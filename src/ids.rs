//! Identity and digest newtypes shared across the consensus core.
//!
//! `EntityId` ordering is the canonical left/right tiebreak (spec §3): the
//! entity whose id is lexicographically smaller on its raw bytes is left.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque 32-byte entity identifier. Ordering is lexicographic on bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub [u8; 32]);

impl EntityId {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True iff `self` is the left side of an account versus `other`.
    #[must_use]
    pub fn is_left_of(&self, other: &Self) -> bool {
        self < other
    }

    /// Canonical (left, right) ordering of two entities.
    #[must_use]
    pub fn order(a: Self, b: Self) -> (Self, Self) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({self})")
    }
}

impl FromStr for EntityId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Keccak-256 digest, used for frame state hashes and dispute hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl FromStr for Hash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// 20-byte jurisdiction (depository) address, EVM-style.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// An entity-quorum signature over a 32-byte digest (spec glossary: "Hanko").
///
/// The core never inspects the bytes beyond emptiness; validity is decided
/// by the external `HankoVerifier`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hanko(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl Hanko {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Hanko {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hanko({}...)", hex::encode(&self.0[..self.0.len().min(4)]))
    }
}
