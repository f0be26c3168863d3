//! Multiplexed Delivery Pool.
//!
//! A bounded set of worker threads, each owning a fixed, disjoint subset of
//! pairs, keeps every data channel fed after startup. Within a worker a
//! full pipe on one pair never delays the write attempt on the next pair.
//!
//! - `worker`: per-pair slot state machine and the pass loop
//! - `pool`: partitioning, thread lifecycle, stop/join and reporting

pub mod pool;
pub mod worker;

pub use pool::{DeliveryHandle, DeliveryPool, DeliveryReport, PoolConfig};
pub use worker::{ChannelState, PairFeed, PairOutcome, PairReport};
