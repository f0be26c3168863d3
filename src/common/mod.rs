//! Shared building blocks used by every stage of the distance feed.
//!
//! - `pairs`: pair keys and the fixed enumeration order the consumer expects
//! - `format`: bit-exact text rendering of distances and samples
//! - `config`: TOML configuration and the policy values derived from it
//! - `error`: crate error type

pub mod config;
pub mod error;
pub mod format;
pub mod pairs;

pub use config::{FeedConfig, RetryPolicy};
pub use error::{FeedError, Result};
pub use format::{DistanceSample, format_distance};
pub use pairs::{PairKey, iter_pairs, pair_count};
