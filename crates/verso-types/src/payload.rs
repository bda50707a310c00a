use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::ContentId;

/// Structural kind of a tracked catalog entity.
///
/// The engine never interprets entity values, but it does compare kinds:
/// replacing a table with a view under the same key is a structural
/// mismatch, reported as `PayloadDiffers`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    /// A table definition.
    Table,
    /// A view definition.
    View,
    /// A namespace (directory of keys).
    Namespace,
    /// A user-defined function.
    Function,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
            Self::Namespace => write!(f, "namespace"),
            Self::Function => write!(f, "function"),
        }
    }
}

/// The committed state of one tracked entity.
///
/// `content_id` is the entity's stable identity (survives value updates);
/// `value` is the catalog-specific body, opaque to the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Stable identity of the entity.
    pub content_id: ContentId,
    /// Structural kind of the entity.
    pub kind: PayloadKind,
    /// Opaque entity body.
    pub value: Value,
}

impl Payload {
    /// Create a payload with a freshly minted identity.
    pub fn new(kind: PayloadKind, value: Value) -> Self {
        Self {
            content_id: ContentId::generate(),
            kind,
            value,
        }
    }

    /// Create a payload carrying an existing identity (entity update).
    pub fn with_id(content_id: ContentId, kind: PayloadKind, value: Value) -> Self {
        Self {
            content_id,
            kind,
            value,
        }
    }
}
