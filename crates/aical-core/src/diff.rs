//! Identity-keyed set comparison.
//!
//! [`diff_by_key`] classifies every item of a local and a remote collection
//! into exactly one of three buckets:
//!
//! - `to_create`: remote items whose key has no local counterpart
//! - `to_update`: local items whose key is also present remotely, paired with
//!   that remote item
//! - `to_delete`: local items whose key is absent remotely
//!
//! Both inputs are indexed by key once, so a diff costs `O(|local| + |remote|)`.
//! Callers must not rely on the order of the resulting buckets.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which bucket a diffed item ended up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffKind::Create => write!(f, "+"),
            DiffKind::Update => write!(f, "~"),
            DiffKind::Delete => write!(f, "-"),
        }
    }
}

/// Result of comparing a local set `L` with a remote set `R`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDiff<L, R> {
    pub to_create: Vec<R>,
    pub to_update: Vec<(L, R)>,
    pub to_delete: Vec<L>,
}

impl<L, R> Default for SetDiff<L, R> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }
}

impl<L, R> SetDiff<L, R> {
    /// Returns true if the diff has nothing in any bucket.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Returns `(create, update, delete)` bucket sizes.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.to_create.len(),
            self.to_update.len(),
            self.to_delete.len(),
        )
    }

    /// Returns the size of the bucket for `kind`.
    pub fn count(&self, kind: DiffKind) -> usize {
        match kind {
            DiffKind::Create => self.to_create.len(),
            DiffKind::Update => self.to_update.len(),
            DiffKind::Delete => self.to_delete.len(),
        }
    }
}

/// Diffs `local` against `remote` using the given identity functions.
///
/// Keys are expected to be unique within each input. A repeated remote key
/// keeps its first occurrence and drops the rest. A repeated local key keeps
/// its first occurrence and sends the later copies to `to_delete`, so every
/// local item lands in exactly one bucket.
pub fn diff_by_key<L, R, K, FL, FR>(
    local: Vec<L>,
    remote: Vec<R>,
    local_key: FL,
    remote_key: FR,
) -> SetDiff<L, R>
where
    K: Eq + Hash + fmt::Debug,
    FL: Fn(&L) -> K,
    FR: Fn(&R) -> K,
{
    let mut remote_slots: Vec<Option<R>> = Vec::with_capacity(remote.len());
    let mut remote_index: HashMap<K, usize> = HashMap::with_capacity(remote.len());

    for item in remote {
        match remote_index.entry(remote_key(&item)) {
            Entry::Occupied(entry) => {
                warn!(key = ?entry.key(), "duplicate remote key, keeping first occurrence");
            }
            Entry::Vacant(entry) => {
                entry.insert(remote_slots.len());
                remote_slots.push(Some(item));
            }
        }
    }

    let mut diff = SetDiff::default();
    let mut seen_local: HashSet<K> = HashSet::with_capacity(local.len());

    for item in local {
        let key = local_key(&item);
        let matched = remote_index.get(&key).copied();
        if seen_local.contains(&key) {
            warn!(key = ?key, "duplicate local key, deleting later occurrence");
            diff.to_delete.push(item);
            continue;
        }
        seen_local.insert(key);

        match matched.and_then(|idx| remote_slots[idx].take()) {
            Some(remote_item) => diff.to_update.push((item, remote_item)),
            None => diff.to_delete.push(item),
        }
    }

    diff.to_create = remote_slots.into_iter().flatten().collect();
    diff
}
