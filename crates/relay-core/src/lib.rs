//! Foundational low-level utilities shared across relay crates.
//!
//! Provides atomic file-write helpers for the persisted bot state, unix time
//! helpers used by request signing, the reconnect backoff policy used by the
//! event-stream supervisor, and text truncation for error replies.

pub mod atomic_io;
pub mod backoff;
pub mod text;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use backoff::{BackoffState, ReconnectBackoff};
pub use text::truncate_for_error;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
