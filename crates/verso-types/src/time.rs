use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as microseconds since the UNIX epoch.
///
/// Commit and reference timestamps are informational only; no algorithm
/// orders by wall-clock time (ordering comes from parent-chain linkage).
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_nonzero_and_monotonic_enough() {
        let a = now_micros();
        let b = now_micros();
        assert!(a > 0);
        assert!(b >= a);
    }
}
