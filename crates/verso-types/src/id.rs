use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Content-addressed identifier for any stored object.
///
/// An `ObjId` is the BLAKE3 hash of an object's canonical encoding.
/// Identical content always produces the same `ObjId`, making objects
/// deduplicatable and storage idempotent.
///
/// The all-zero value is reserved as the "no ancestor" sentinel: the
/// pointer of an empty branch and the parent of a root commit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjId([u8; 32]);

impl ObjId {
    /// Compute an `ObjId` by hashing raw bytes.
    pub fn hash_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create an `ObjId` from a pre-computed hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The "no ancestor" sentinel (all zeros).
    ///
    /// Used as the pointer of an empty branch and as the sole parent of a
    /// root commit. It never names a stored object.
    pub const fn no_ancestor() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the "no ancestor" sentinel.
    pub fn is_no_ancestor(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjId({})", self.short_hex())
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for ObjId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<ObjId> for [u8; 32] {
    fn from(id: ObjId) -> Self {
        id.0
    }
}

/// Stable identity of a tracked catalog entity.
///
/// Unlike [`ObjId`], a `ContentId` survives value changes: it is assigned
/// once when an entity is created and carried through every subsequent
/// update. A key whose current entity has a different `ContentId` than a
/// caller expected was dropped and recreated under the same name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentId(Uuid);

impl ContentId {
    /// Mint a fresh identity (UUID v7, time-ordered).
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for ContentId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidContentId(e.to_string()))
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_bytes_is_deterministic() {
        let data = b"hello world";
        let id1 = ObjId::hash_bytes(data);
        let id2 = ObjId::hash_bytes(data);
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_data_produces_different_ids() {
        let id1 = ObjId::hash_bytes(b"hello");
        let id2 = ObjId::hash_bytes(b"world");
        assert_ne!(id1, id2);
    }

    #[test]
    fn no_ancestor_is_all_zeros() {
        let sentinel = ObjId::no_ancestor();
        assert!(sentinel.is_no_ancestor());
        assert_eq!(sentinel.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn hex_roundtrip() {
        let id = ObjId::hash_bytes(b"test");
        let hex = id.to_hex();
        let parsed = ObjId::from_hex(&hex).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ObjId::from_hex("abcd").unwrap_err();
        assert!(matches!(err, TypeError::InvalidLength { .. }));
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let err = ObjId::from_hex("zz").unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn display_is_full_hex() {
        let id = ObjId::hash_bytes(b"test");
        let display = format!("{id}");
        assert_eq!(display.len(), 64);
        assert_eq!(display, id.to_hex());
    }

    #[test]
    fn ordering_is_consistent() {
        let id1 = ObjId::from_hash([0; 32]);
        let id2 = ObjId::from_hash([1; 32]);
        assert!(id1 < id2);
    }

    #[test]
    fn content_id_generate_is_unique() {
        let a = ContentId::generate();
        let b = ContentId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn content_id_parse_roundtrip() {
        let id = ContentId::generate();
        let parsed: ContentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn content_id_parse_rejects_garbage() {
        let err = "not-a-uuid".parse::<ContentId>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidContentId(_)));
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjId::hash_bytes(b"serde test");
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
