//! Threshold-based contact detection over distance streams.

use std::collections::BTreeMap;
use std::thread;

use crate::common::{DistanceSample, PairKey};

/// How a distance equal to the threshold is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boundary {
    /// `distance <= threshold` is in contact.
    #[default]
    Inclusive,
    /// `distance < threshold` is in contact.
    Exclusive,
}

/// A closed contact period `[start_us, end_us]` with `start_us < end_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContactInterval {
    pub start_us: u64,
    pub end_us: u64,
}

/// Contact detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactExtractor {
    pub threshold: f64,
    /// Scanning stops at this timestamp; contacts still open are closed here.
    pub max_us: u64,
    pub boundary: Boundary,
}

impl ContactExtractor {
    pub fn new(threshold: f64, max_us: u64) -> Self {
        Self {
            threshold,
            max_us,
            boundary: Boundary::Inclusive,
        }
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn in_contact(&self, distance: f64) -> bool {
        match self.boundary {
            Boundary::Inclusive => distance <= self.threshold,
            Boundary::Exclusive => distance < self.threshold,
        }
    }

    /// Scan one pair's stream and return its contact intervals.
    ///
    /// Samples after `max_us` are never pulled beyond the first one that
    /// proves the limit was passed, so infinite streams are fine.
    pub fn extract<I>(&self, samples: I) -> Vec<ContactInterval>
    where
        I: IntoIterator<Item = DistanceSample>,
    {
        let mut scanner = ContactScanner::new(*self);
        for sample in samples {
            if !scanner.feed(sample) {
                break;
            }
        }
        scanner.finish()
    }
}

/// Incremental form of [`ContactExtractor::extract`] for interleaved scanning.
#[derive(Debug, Clone)]
pub struct ContactScanner {
    extractor: ContactExtractor,
    open_since: Option<u64>,
    last_us: Option<u64>,
    reached_max: bool,
    intervals: Vec<ContactInterval>,
}

impl ContactScanner {
    pub fn new(extractor: ContactExtractor) -> Self {
        Self {
            extractor,
            open_since: None,
            last_us: None,
            reached_max: false,
            intervals: Vec::new(),
        }
    }

    /// Consume one sample. Returns false once no further samples are needed.
    pub fn feed(&mut self, sample: DistanceSample) -> bool {
        if self.reached_max {
            return false;
        }
        let ts = sample.timestamp_us;
        if ts > self.extractor.max_us {
            self.reached_max = true;
            return false;
        }
        self.last_us = Some(ts);

        if self.extractor.in_contact(sample.distance) {
            if self.open_since.is_none() {
                self.open_since = Some(ts);
            }
        } else if let Some(start) = self.open_since.take() {
            self.emit(start, ts);
        }

        if ts == self.extractor.max_us {
            self.reached_max = true;
        }
        !self.reached_max
    }

    /// Close any open contact and return the intervals found.
    ///
    /// An open contact ends at `max_us` if the stream reached it, otherwise
    /// at the last sample seen.
    pub fn finish(mut self) -> Vec<ContactInterval> {
        if let Some(start) = self.open_since.take() {
            let end = if self.reached_max { self.extractor.max_us } else { self.last_us.unwrap_or(start) };
            self.emit(start, end);
        }
        self.intervals
    }

    fn emit(&mut self, start_us: u64, end_us: u64) {
        // Zero-length contacts are dropped.
        if start_us < end_us {
            self.intervals.push(ContactInterval { start_us, end_us });
        }
    }
}

/// Extract contact intervals for every pair in parallel.
///
/// Pairs are split across `workers` scoped threads; each thread advances
/// its pairs one sample at a time in turn, which keeps fan-out views that
/// share a Position Source close together.
pub fn extract_all<I>(streams: BTreeMap<PairKey, I>, extractor: ContactExtractor, workers: usize) -> BTreeMap<PairKey, Vec<ContactInterval>>
where
    I: Iterator<Item = DistanceSample> + Send,
{
    let workers = workers.min(streams.len()).max(1);
    let mut partitions: Vec<Vec<(PairKey, I)>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, entry) in streams.into_iter().enumerate() {
        partitions[i % workers].push(entry);
    }

    thread::scope(|scope| {
        let handles: Vec<_> = partitions
            .into_iter()
            .map(|partition| scope.spawn(move || scan_interleaved(partition, extractor)))
            .collect();

        let mut results = BTreeMap::new();
        for handle in handles {
            match handle.join() {
                Ok(pairs) => results.extend(pairs),
                Err(_) => log::error!("Contact extraction thread panicked"),
            }
        }
        results
    })
}

fn scan_interleaved<I>(partition: Vec<(PairKey, I)>, extractor: ContactExtractor) -> Vec<(PairKey, Vec<ContactInterval>)>
where
    I: Iterator<Item = DistanceSample>,
{
    let mut active: Vec<(PairKey, I, ContactScanner)> = partition.into_iter().map(|(pair, stream)| (pair, stream, ContactScanner::new(extractor))).collect();
    let mut done = Vec::with_capacity(active.len());

    while !active.is_empty() {
        let mut i = 0;
        while i < active.len() {
            let (_, stream, scanner) = &mut active[i];
            let more = match stream.next() {
                Some(sample) => scanner.feed(sample),
                None => false,
            };
            if more {
                i += 1;
            } else {
                let (pair, _, scanner) = active.swap_remove(i);
                done.push((pair, scanner.finish()));
            }
        }
    }
    done
}
