use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of a trust mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustChange {
    Updated,
    Unchanged,
}

/// User id -> trusted flag.
///
/// An empty table is "open" mode: every user is trusted. As soon as any entry
/// exists, only users explicitly mapped to `true` are trusted, so recording a
/// single `false` entry closes the bot to everyone not listed as trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustStore(BTreeMap<String, bool>);

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_trusted(&self, user_id: &str) -> bool {
        if self.is_open() {
            return true;
        }
        self.0.get(user_id).copied().unwrap_or(false)
    }

    pub fn get(&self, user_id: &str) -> Option<bool> {
        self.0.get(user_id).copied()
    }

    /// Sets the flag for `user_id`; an existing identical entry is left alone.
    pub fn set(&mut self, user_id: &str, trusted: bool) -> TrustChange {
        match self.0.get(user_id) {
            Some(current) if *current == trusted => TrustChange::Unchanged,
            _ => {
                self.0.insert(user_id.to_string(), trusted);
                TrustChange::Updated
            }
        }
    }

    pub(crate) fn restore(&mut self, user_id: &str, previous: Option<bool>) {
        match previous {
            Some(flag) => {
                self.0.insert(user_id.to_string(), flag);
            }
            None => {
                self.0.remove(user_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(user_id, trusted)| (user_id.as_str(), *trusted))
    }
}

impl FromIterator<(String, bool)> for TrustStore {
    fn from_iter<T: IntoIterator<Item = (String, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
