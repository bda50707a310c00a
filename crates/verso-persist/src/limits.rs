use serde::{Deserialize, Serialize};

/// Backend-declared size limits.
///
/// `max_obj_size` is a hard limit: the backend rejects larger objects with
/// `ObjTooLarge` unless the caller explicitly allows oversize writes.
/// `index_segment_size` is the target the commit engine uses when splitting
/// a key index into segment objects; it must leave comfortable headroom
/// under the hard limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLimits {
    /// Hard per-object size limit in bytes.
    pub max_obj_size: usize,
    /// Target encoded size of one index segment, in bytes.
    pub index_segment_size: usize,
}

impl StoreLimits {
    /// Limits suitable for row-oriented backends (250 KiB hard cap).
    pub const DEFAULT: StoreLimits = StoreLimits {
        max_obj_size: 250 * 1024,
        index_segment_size: 128 * 1024,
    };
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_target_leaves_headroom() {
        let limits = StoreLimits::default();
        assert!(limits.index_segment_size < limits.max_obj_size);
    }
}
