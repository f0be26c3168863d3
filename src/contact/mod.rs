//! Contact Interval Extractor.
//!
//! Offline reader of distance streams: partitions each pair's timeline into
//! contact intervals against a distance threshold.

pub mod extractor;

pub use extractor::{Boundary, ContactExtractor, ContactInterval, ContactScanner, extract_all};
