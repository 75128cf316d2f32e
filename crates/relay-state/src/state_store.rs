use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use relay_core::write_text_atomic;
use serde::{Deserialize, Deserializer, Serialize};

use crate::trust::{TrustChange, TrustStore};

/// The persisted record: `{ "trusted": { userId: bool }, "lastPost": id }`.
///
/// Files written by older deployments use `Trusted`/`LastPost` keys and may
/// carry `null` for an empty table; both load transparently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotState {
    #[serde(default, alias = "Trusted", deserialize_with = "null_as_empty")]
    pub trusted: TrustStore,
    #[serde(default, rename = "lastPost", alias = "LastPost")]
    pub last_post: u64,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<TrustStore, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<TrustStore>::deserialize(deserializer)?.unwrap_or_default())
}

/// Owns the bot state behind a single exclusive lock and persists it to disk.
///
/// Every accessor holds the lock only for its own critical section; the guard
/// is a `std::sync::MutexGuard`, which cannot be held across an `.await` in a
/// spawned task, so no network call ever runs while the state is locked.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: Mutex<BotState>,
}

impl StateStore {
    /// Loads the state file. A missing file yields an empty state; an
    /// unreadable or corrupt file is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<BotState>(&raw)
                .with_context(|| format!("failed to parse data file {}", path.display()))?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no data file yet, starting with empty state");
                BotState::default()
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read data file {}", path.display()))
            }
        };
        Ok(Self::with_state(path, state))
    }

    pub fn with_state(path: impl Into<PathBuf>, state: BotState) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> Result<BotState> {
        Ok(self.lock()?.clone())
    }

    /// Rewrites the state file while holding the lock.
    pub fn save(&self) -> Result<()> {
        let guard = self.lock()?;
        self.persist(&guard)
    }

    pub fn is_trusted(&self, user_id: &str) -> Result<bool> {
        Ok(self.lock()?.trusted.is_trusted(user_id))
    }

    /// Sets the trust flag and persists it before returning. When the write
    /// fails the in-memory table is rolled back so memory and disk agree.
    pub fn set_trust(&self, user_id: &str, trusted: bool) -> Result<TrustChange> {
        let mut guard = self.lock()?;
        let previous = guard.trusted.get(user_id);
        let change = guard.trusted.set(user_id, trusted);
        if change == TrustChange::Unchanged {
            return Ok(change);
        }
        if let Err(error) = self.persist(&guard) {
            guard.trusted.restore(user_id, previous);
            return Err(error);
        }
        Ok(change)
    }

    pub fn feed_cursor(&self) -> Result<u64> {
        Ok(self.lock()?.last_post)
    }

    /// Raises the feed cursor to the largest of `ids` and persists it.
    ///
    /// The cursor never moves backwards; the returned value is the cursor
    /// after the call.
    pub fn advance_feed_cursor<I>(&self, ids: I) -> Result<u64>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut guard = self.lock()?;
        let current = guard.last_post;
        let candidate = ids.into_iter().fold(current, u64::max);
        if candidate == current {
            return Ok(current);
        }
        guard.last_post = candidate;
        if let Err(error) = self.persist(&guard) {
            guard.last_post = current;
            return Err(error);
        }
        Ok(candidate)
    }

    fn lock(&self) -> Result<MutexGuard<'_, BotState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("bot state mutex is poisoned"))
    }

    fn persist(&self, state: &BotState) -> Result<()> {
        let mut payload = serde_json::to_string_pretty(state).context("failed to serialize bot state")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write data file {}", self.path.display()))
    }
}
