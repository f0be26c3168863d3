//! Pair keys and pair enumeration.
//!
//! The downstream channel simulator indexes data channels positionally, so
//! the enumeration order here is part of the wire contract: ascending outer
//! index, ascending inner index, emitting only `a > b`.

use std::fmt;

/// Unordered node pair, stored with `a > b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub a: usize,
    pub b: usize,
}

impl PairKey {
    /// Build a key from two distinct node indices in either order.
    ///
    /// Returns `None` when both indices are equal.
    pub fn new(x: usize, y: usize) -> Option<Self> {
        if x == y {
            return None;
        }
        Some(Self { a: x.max(y), b: x.min(y) })
    }

    /// Position of this pair in the enumeration produced by [`iter_pairs`].
    pub fn ordinal(&self) -> usize {
        pair_count(self.a) + self.b
    }

    /// File name of the pair's data channel inside the pipe directory.
    pub fn channel_file_name(&self) -> String {
        format!("{}-{}.dist", self.a, self.b)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.a, self.b)
    }
}

/// Number of unordered pairs among `node_count` nodes.
pub fn pair_count(node_count: usize) -> usize {
    node_count * node_count.saturating_sub(1) / 2
}

/// Enumerate all pairs for `node_count` nodes in channel order.
pub fn iter_pairs(node_count: usize) -> impl Iterator<Item = PairKey> {
    (0..node_count).flat_map(|a| (0..a).map(move |b| PairKey { a, b }))
}
