//! Diffing two key indexes.

use verso_types::{Payload, StoreKey};

use crate::index::KeyIndex;

/// How one key changed between two indexes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyChange {
    Added { payload: Payload },
    Removed { payload: Payload },
    Modified { from: Payload, to: Payload },
}

/// One key's change in a diff, in key order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyDiffEntry {
    pub key: StoreKey,
    pub change: KeyChange,
}

/// Compute the key-level difference between two indexes, from `from` to
/// `to`. Keys present in both with an identical payload are omitted.
pub fn diff_indexes(from: &KeyIndex, to: &KeyIndex) -> Vec<KeyDiffEntry> {
    let mut entries = Vec::new();
    let mut old = from.iter().peekable();
    let mut new = to.iter().peekable();

    // Both iterators are key-ordered, so a single joint pass suffices.
    loop {
        match (old.peek(), new.peek()) {
            (Some((ok, ov)), Some((nk, nv))) => {
                use std::cmp::Ordering;
                match ok.cmp(nk) {
                    Ordering::Less => {
                        entries.push(KeyDiffEntry {
                            key: (*ok).clone(),
                            change: KeyChange::Removed {
                                payload: (*ov).clone(),
                            },
                        });
                        old.next();
                    }
                    Ordering::Greater => {
                        entries.push(KeyDiffEntry {
                            key: (*nk).clone(),
                            change: KeyChange::Added {
                                payload: (*nv).clone(),
                            },
                        });
                        new.next();
                    }
                    Ordering::Equal => {
                        if ov != nv {
                            entries.push(KeyDiffEntry {
                                key: (*ok).clone(),
                                change: KeyChange::Modified {
                                    from: (*ov).clone(),
                                    to: (*nv).clone(),
                                },
                            });
                        }
                        old.next();
                        new.next();
                    }
                }
            }
            (Some((ok, ov)), None) => {
                entries.push(KeyDiffEntry {
                    key: (*ok).clone(),
                    change: KeyChange::Removed {
                        payload: (*ov).clone(),
                    },
                });
                old.next();
            }
            (None, Some((nk, nv))) => {
                entries.push(KeyDiffEntry {
                    key: (*nk).clone(),
                    change: KeyChange::Added {
                        payload: (*nv).clone(),
                    },
                });
                new.next();
            }
            (None, None) => break,
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use verso_types::{CommitOp, PayloadKind};

    fn key(s: &str) -> StoreKey {
        s.parse().unwrap()
    }

    fn table(v: u64) -> Payload {
        Payload::new(PayloadKind::Table, json!({ "v": v }))
    }

    fn index_with(entries: Vec<(&str, Payload)>) -> KeyIndex {
        let mut index = KeyIndex::empty();
        let delta: BTreeMap<StoreKey, CommitOp> = entries
            .into_iter()
            .map(|(k, p)| (key(k), CommitOp::put_new(p)))
            .collect();
        index.apply(&delta);
        index
    }

    #[test]
    fn identical_indexes_diff_empty() {
        let p = table(1);
        let a = index_with(vec![("x", p.clone())]);
        let b = index_with(vec![("x", p)]);
        assert!(diff_indexes(&a, &b).is_empty());
    }

    #[test]
    fn added_removed_and_modified_are_classified() {
        let kept = table(0);
        let before = table(1);
        let after = table(2);
        let gone = table(3);
        let fresh = table(4);

        let from = index_with(vec![
            ("changed", before.clone()),
            ("gone", gone.clone()),
            ("same", kept.clone()),
        ]);
        let to = index_with(vec![
            ("changed", after.clone()),
            ("fresh", fresh.clone()),
            ("same", kept),
        ]);

        let diff = diff_indexes(&from, &to);
        assert_eq!(diff.len(), 3);
        assert_eq!(diff[0].key, key("changed"));
        assert_eq!(
            diff[0].change,
            KeyChange::Modified {
                from: before,
                to: after
            }
        );
        assert_eq!(diff[1].key, key("fresh"));
        assert_eq!(diff[1].change, KeyChange::Added { payload: fresh });
        assert_eq!(diff[2].key, key("gone"));
        assert_eq!(diff[2].change, KeyChange::Removed { payload: gone });
    }

    #[test]
    fn diff_against_empty_index_is_all_added() {
        let p = table(1);
        let to = index_with(vec![("a", p.clone()), ("b", table(2))]);
        let diff = diff_indexes(&KeyIndex::empty(), &to);
        assert_eq!(diff.len(), 2);
        assert!(diff
            .iter()
            .all(|e| matches!(e.change, KeyChange::Added { .. })));
    }
}
