//! Real-time distance feed for mobility-driven network simulations.
//!
//! A single Position Source is fanned out into one `(timestamp, distance)`
//! stream per node pair and delivered over named pipes to an external
//! channel simulator:
//!
//! ```text
//! PositionSource -> fanout -> delivery pool -> FIFOs -> consumer
//!                               ^
//!                   pipes (control channel, open, prime)
//! ```
//!
//! `contact` is an independent offline reader of the same stream type.

pub mod common;
pub mod contact;
pub mod delivery;
pub mod engine;
pub mod fanout;
pub mod mobility;
pub mod pipes;

pub use common::{DistanceSample, FeedConfig, FeedError, PairKey, Result};
pub use engine::Engine;
