//! Distance Fan-Out.
//!
//! Turns one Position Source into one independent, lazily advanced
//! `(timestamp, distance)` stream per node pair without re-running the
//! source per pair. See [`tee`] for the buffering and locking scheme.

pub mod tee;

pub use tee::{DistanceView, derive, derive_with_fixed};
