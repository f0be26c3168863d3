//! Fixed-position and fixed-distance nodes.
//!
//! Node 0 is conventionally a fixed central node that the mobility models
//! know nothing about; [`WithFixedNode`] prefixes it to every snapshot of a
//! mobile-only source. Auxiliary fixed devices that only need a constant
//! distance to everyone are described by [`FixedDistances`].

use super::position::{Point, PositionSource, Snapshot};
use crate::common::Result;

/// Prefixes a node at a fixed position to every snapshot, shifting mobile nodes to `1..=N`.
pub struct WithFixedNode<S> {
    inner: S,
    position: Point,
}

impl<S: PositionSource> WithFixedNode<S> {
    pub fn new(inner: S, position: Point) -> Self {
        Self { inner, position }
    }
}

impl<S: PositionSource> PositionSource for WithFixedNode<S> {
    fn node_count(&self) -> usize {
        self.inner.node_count() + 1
    }

    fn next_snapshot(&mut self) -> Option<Result<Snapshot>> {
        let mobile = self.inner.next_snapshot()?;
        Some(mobile.map(|snapshot| {
            let mut positions = Vec::with_capacity(snapshot.node_count() + 1);
            positions.push(self.position);
            positions.extend(snapshot.positions);
            Snapshot::new(positions)
        }))
    }
}

/// Nodes appended after the Position Source's nodes whose distance to any
/// other node is a model-independent constant.
///
/// With a source of `n` nodes, entry `i` describes node `n + i`. For a pair
/// of two fixed-distance nodes the larger of the two constants is used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixedDistances {
    distances: Vec<f64>,
}

impl FixedDistances {
    pub fn new(distances: Vec<f64>) -> Self {
        Self { distances }
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Constant distance for a pair, if either node is a fixed-distance node.
    ///
    /// # Parameters
    ///
    /// * `mobile_count` - Node count of the underlying Position Source
    /// * `a`, `b` - Node indices of the pair
    pub fn pair_distance(&self, mobile_count: usize, a: usize, b: usize) -> Option<f64> {
        let lookup = |node: usize| node.checked_sub(mobile_count).and_then(|i| self.distances.get(i).copied());
        match (lookup(a), lookup(b)) {
            (Some(da), Some(db)) => Some(da.max(db)),
            (Some(d), None) | (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobility::IterSource;

    #[test]
    fn fixed_node_is_prefixed() {
        let mobile = vec![Snapshot::new(vec![Point::new(3.0, 4.0)])];
        let mut source = WithFixedNode::new(IterSource::new(1, mobile.into_iter()), Point::new(0.0, 0.0));
        assert_eq!(source.node_count(), 2);
        let snapshot = source.next_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.positions[0], Point::new(0.0, 0.0));
        assert_eq!(snapshot.distance(1, 0), Some(5.0));
        assert!(source.next_snapshot().is_none());
    }

    #[test]
    fn fixed_distance_lookup() {
        let fixed = FixedDistances::new(vec![7.0, 2.0]);
        assert_eq!(fixed.pair_distance(3, 2, 1), None);
        assert_eq!(fixed.pair_distance(3, 3, 0), Some(7.0));
        assert_eq!(fixed.pair_distance(3, 4, 1), Some(2.0));
        assert_eq!(fixed.pair_distance(3, 4, 3), Some(7.0));
    }
}
