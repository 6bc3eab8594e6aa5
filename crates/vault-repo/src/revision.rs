//! Ref snapshots and push updates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vault_hash::ObjectId;

/// The symbolic default ref, advertised first on every non-empty request.
pub const HEAD: &str = "HEAD";

/// The branch whose updates also move `HEAD`.
pub const DEFAULT_BRANCH: &str = "refs/heads/master";

/// An immutable snapshot of every visible ref at one point in the log.
///
/// Serialises as a single JSON object mapping ref names to 40-char hex
/// object ids, which is the element type of `revisions.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision {
    refs: BTreeMap<String, ObjectId>,
}

impl Revision {
    /// The empty snapshot (fresh repository).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.refs.get(name).copied()
    }

    /// The value of `HEAD`, if present.
    pub fn head(&self) -> Option<ObjectId> {
        self.get(HEAD)
    }

    pub fn set(&mut self, name: impl Into<String>, id: ObjectId) {
        self.refs.insert(name.into(), id);
    }

    pub fn remove(&mut self, name: &str) {
        self.refs.remove(name);
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Iterate `(name, id)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.refs.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// The object ids reachable as ref values, deduplicated.
    ///
    /// `HEAD` aliases another ref by invariant, so the result is usually
    /// one element smaller than [`len`](Self::len).
    pub fn value_set(&self) -> std::collections::HashSet<ObjectId> {
        self.refs.values().copied().collect()
    }

    /// Derive the successor snapshot a push produces.
    ///
    /// Deletes apply for an empty `new_id`, everything else is an upsert.
    /// An update to the default branch also moves `HEAD`, keeping the
    /// HEAD-aliases-a-ref invariant without the client naming it.
    pub fn with_updates(&self, updates: &[RefUpdate]) -> Revision {
        let mut next = self.clone();
        for update in updates {
            if update.name == DEFAULT_BRANCH {
                if let Some(id) = update.new_id {
                    next.set(HEAD, id);
                }
            }
            match update.new_id {
                Some(id) => next.set(update.name.clone(), id),
                None => next.remove(&update.name),
            }
        }
        next
    }
}

impl FromIterator<(String, ObjectId)> for Revision {
    fn from_iter<I: IntoIterator<Item = (String, ObjectId)>>(iter: I) -> Self {
        Self {
            refs: iter.into_iter().collect(),
        }
    }
}

/// One ref delta in a push: `None` for `old_id` means create, `None` for
/// `new_id` means delete. Never persisted directly; folded into the next
/// [`Revision`] via [`Revision::with_updates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: String,
    pub old_id: Option<ObjectId>,
    pub new_id: Option<ObjectId>,
}
