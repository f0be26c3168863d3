//! Position Source boundary.
//!
//! The mobility models themselves live outside this crate. What lives here
//! is the pull-based contract the rest of the feed depends on plus a few
//! adapters for feeding recorded or synthetic positions through it:
//!
//! - `position`: `Point`, `Snapshot` and the `PositionSource` trait
//! - `snapshot_file`: replay of recorded JSON-lines snapshot files
//! - `fixed`: fixed central node and fixed-distance auxiliary nodes

pub mod fixed;
pub mod position;
pub mod snapshot_file;

pub use fixed::{FixedDistances, WithFixedNode};
pub use position::{IterSource, Point, PositionSource, Snapshot};
pub use snapshot_file::SnapshotFile;
