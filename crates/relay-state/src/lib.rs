//! Persisted bot state: the trusted-user table and the feed cursor.
//!
//! The whole record lives behind one exclusive lock inside [`StateStore`] and
//! is rewritten wholesale to a single JSON file after every mutation.

mod state_store;
mod trust;

pub use state_store::{BotState, StateStore};
pub use trust::{TrustChange, TrustStore};
