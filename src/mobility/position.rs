//! Positions, snapshots and the Position Source trait.

use serde::Deserialize;

use crate::common::{FeedError, Result};

/// A node position. `z` defaults to 0 for planar models.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(from = "PointRepr")]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Euclidean distance between two points.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Recorded positions are written either as `[x, y]`, `[x, y, z]` or as an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum PointRepr {
    Planar([f64; 2]),
    Spatial([f64; 3]),
    Named {
        x: f64,
        y: f64,
        #[serde(default)]
        z: f64,
    },
}

impl From<PointRepr> for Point {
    fn from(repr: PointRepr) -> Self {
        match repr {
            PointRepr::Planar([x, y]) => Point { x, y, z: 0.0 },
            PointRepr::Spatial([x, y, z]) => Point { x, y, z },
            PointRepr::Named { x, y, z } => Point { x, y, z },
        }
    }
}

/// Positions of every node at one time step, indexed by node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub positions: Vec<Point>,
}

impl Snapshot {
    pub fn new(positions: Vec<Point>) -> Self {
        Self { positions }
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    /// Distance between two nodes, `None` if either index is out of range.
    pub fn distance(&self, a: usize, b: usize) -> Option<f64> {
        Some(self.positions.get(a)?.distance(self.positions.get(b)?))
    }
}

/// Pull-based, ordered generator of snapshots, one per fixed time step.
///
/// The node count is fixed for the source's lifetime. Returning `None`
/// means the source is exhausted; an `Err` also ends the stream for every
/// consumer.
pub trait PositionSource: Send {
    fn node_count(&self) -> usize;

    fn next_snapshot(&mut self) -> Option<Result<Snapshot>>;
}

impl<S: PositionSource + ?Sized> PositionSource for Box<S> {
    fn node_count(&self) -> usize {
        (**self).node_count()
    }

    fn next_snapshot(&mut self) -> Option<Result<Snapshot>> {
        (**self).next_snapshot()
    }
}

/// Adapts any snapshot iterator into a [`PositionSource`].
///
/// Snapshots whose node count differs from the declared one are reported
/// as source errors.
pub struct IterSource<I> {
    iter: I,
    node_count: usize,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Snapshot> + Send,
{
    pub fn new(node_count: usize, iter: I) -> Self {
        Self { iter, node_count }
    }
}

impl<I> PositionSource for IterSource<I>
where
    I: Iterator<Item = Snapshot> + Send,
{
    fn node_count(&self) -> usize {
        self.node_count
    }

    fn next_snapshot(&mut self) -> Option<Result<Snapshot>> {
        let snapshot = self.iter.next()?;
        if snapshot.node_count() != self.node_count {
            return Some(Err(FeedError::Source(format!(
                "snapshot has {} positions, expected {}",
                snapshot.node_count(),
                self.node_count
            ))));
        }
        Some(Ok(snapshot))
    }
}
