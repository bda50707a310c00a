use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Separator between key segments in the canonical string form.
pub const KEY_SEPARATOR: char = '/';

/// Hierarchical key identifying a tracked entity within the catalog index.
///
/// A `StoreKey` is an ordered sequence of non-empty name segments, e.g.
/// `["analytics", "events", "clicks"]` rendered as `analytics/events/clicks`.
/// Keys are totally ordered lexicographically over their segments; this
/// ordering is load-bearing for paginated scans, index segmentation, and
/// diff algorithms.
///
/// Serialized as the canonical string form, so segments may not contain the
/// separator or NUL.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    segments: Vec<String>,
}

impl StoreKey {
    /// Build a key from segments, validating each.
    pub fn new<I, S>(segments: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(TypeError::InvalidKey("key has no segments".into()));
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(TypeError::InvalidKey("empty segment".into()));
            }
            if segment.contains(KEY_SEPARATOR) || segment.contains('\0') {
                return Err(TypeError::InvalidKey(format!(
                    "segment {segment:?} contains a reserved character"
                )));
            }
        }
        Ok(Self { segments })
    }

    /// The key's segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment (entity name).
    pub fn name(&self) -> &str {
        self.segments.last().expect("keys are never empty")
    }

    /// The enclosing key, if any (all segments but the last).
    pub fn parent(&self) -> Option<StoreKey> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`: keys have at least one segment.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl FromStr for StoreKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(KEY_SEPARATOR))
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({self})")
    }
}

impl Serialize for StoreKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StoreKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
