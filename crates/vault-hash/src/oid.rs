use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hex::{hex_decode, hex_to_string};
use crate::HashError;

/// A git object identifier: the SHA-1 of an object's content.
///
/// Carries the raw 20-byte digest inline. On the wire and in
/// `revisions.json` it appears as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// The null OID (all zeros), used by push lines to mean create/delete.
    pub const NULL: Self = Self([0u8; 20]);

    /// Length of the hex representation.
    pub const HEX_LEN: usize = 40;

    /// Create an ObjectId from a raw 20-byte digest.
    pub const fn from_raw(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse an ObjectId from 40 hex characters.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let mut bytes = [0u8; 20];
        hex_decode(hex, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the null (all-zeros) OID.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// The lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex_to_string(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}
