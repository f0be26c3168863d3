//! Broadcast tee over a single Position Source.
//!
//! Produced snapshots form an append-only singly linked chain. Every view
//! holds an `Arc` on the link of the next snapshot it has to read, so a
//! snapshot stays alive exactly as long as some view has not consumed it
//! and is freed as soon as the slowest view moves past it or is dropped.
//!
//! Reading an already produced snapshot is a lock-free `OnceLock::get` on
//! the view's own link. Only the tail link is ever unfilled; filling it runs
//! the Position Source under the `producer` mutex, so the source advances
//! once per step no matter how many views are waiting on it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::common::{DistanceSample, PairKey, iter_pairs};
use crate::mobility::{FixedDistances, PositionSource, Snapshot};

/// One position in the chain; filled once, when its step is produced.
struct Link {
    entry: OnceLock<Entry>,
}

enum Entry {
    Produced { snapshot: Retained, next: Arc<Link> },
    /// The source is exhausted or failed; nothing follows.
    End,
}

/// A buffered snapshot, counted in `Shared::retained` while alive.
struct Retained {
    snapshot: Snapshot,
    retained: Arc<AtomicUsize>,
}

impl Drop for Retained {
    fn drop(&mut self) {
        self.retained.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Link {
    fn new() -> Arc<Self> {
        Arc::new(Self { entry: OnceLock::new() })
    }
}

impl Drop for Link {
    // Unlinked iteratively: a long unread chain would otherwise recurse once per snapshot.
    fn drop(&mut self) {
        let mut next = match self.entry.take() {
            Some(Entry::Produced { next, .. }) => next,
            _ => return,
        };
        while let Ok(mut link) = Arc::try_unwrap(next) {
            match link.entry.take() {
                Some(Entry::Produced { next: following, .. }) => next = following,
                _ => return,
            }
        }
    }
}

struct Shared {
    producer: Mutex<Box<dyn PositionSource>>,
    retained: Arc<AtomicUsize>,
    mobile_count: usize,
    fixed: FixedDistances,
    step_us: u64,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Entry for `step` stored in `link`, producing it first if `link` is the unfilled tail.
    fn entry<'a>(&self, link: &'a Link, step: u64) -> &'a Entry {
        link.entry.get_or_init(|| self.produce(step))
    }

    fn produce(&self, step: u64) -> Entry {
        let mut source = lock(&self.producer);
        match source.next_snapshot() {
            Some(Ok(snapshot)) => {
                log::trace!("Produced snapshot for step {}", step);
                self.retained.fetch_add(1, Ordering::AcqRel);
                Entry::Produced {
                    snapshot: Retained {
                        snapshot,
                        retained: Arc::clone(&self.retained),
                    },
                    next: Link::new(),
                }
            }
            Some(Err(e)) => {
                log::error!("Position source failed at step {}, ending all distance streams: {}", step, e);
                Entry::End
            }
            None => {
                log::debug!("Position source exhausted after {} steps", step);
                Entry::End
            }
        }
    }

    fn distance(&self, pair: PairKey, snapshot: &Snapshot) -> Option<f64> {
        match self.fixed.pair_distance(self.mobile_count, pair.a, pair.b) {
            Some(d) => Some(d),
            None => snapshot.distance(pair.a, pair.b),
        }
    }
}

/// One pair's lazily advanced distance stream.
///
/// The `k`-th item corresponds to the `k`-th snapshot of the Position
/// Source, with `timestamp_us = k * step_us`. Dropping the view releases
/// every snapshot it has not read yet.
pub struct DistanceView {
    shared: Arc<Shared>,
    pair: PairKey,
    cursor: Arc<Link>,
    position: u64,
    done: bool,
}

impl DistanceView {
    pub fn pair(&self) -> PairKey {
        self.pair
    }

    /// Index of the next snapshot this view will read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of snapshots currently retained for lagging views.
    pub fn buffered(&self) -> usize {
        self.shared.retained.load(Ordering::Acquire)
    }
}

impl Iterator for DistanceView {
    type Item = DistanceSample;

    fn next(&mut self) -> Option<DistanceSample> {
        if self.done {
            return None;
        }
        let step = self.position;
        let (distance, next) = match self.shared.entry(&self.cursor, step) {
            Entry::Produced { snapshot, next } => (self.shared.distance(self.pair, &snapshot.snapshot), Arc::clone(next)),
            Entry::End => {
                self.done = true;
                return None;
            }
        };
        self.cursor = next;
        self.position += 1;

        match distance {
            Some(distance) => Some(DistanceSample {
                timestamp_us: step * self.shared.step_us,
                distance,
            }),
            None => {
                log::error!("Snapshot at step {} has no position for pair {}", step, self.pair);
                self.done = true;
                None
            }
        }
    }
}

/// Fan a Position Source out into one distance stream per node pair.
///
/// # Parameters
///
/// * `source` - The shared Position Source; it is advanced once per step
/// * `step_us` - Duration of one source step in microseconds
///
/// # Returns
///
/// One view per pair of the source's nodes, keyed in channel order.
pub fn derive<S>(source: S, step_us: u64) -> BTreeMap<PairKey, DistanceView>
where
    S: PositionSource + 'static,
{
    derive_with_fixed(source, FixedDistances::default(), step_us)
}

/// Like [`derive`], with extra fixed-distance nodes appended after the source's nodes.
pub fn derive_with_fixed<S>(source: S, fixed: FixedDistances, step_us: u64) -> BTreeMap<PairKey, DistanceView>
where
    S: PositionSource + 'static,
{
    let mobile_count = source.node_count();
    let node_count = mobile_count + fixed.len();

    let shared = Arc::new(Shared {
        producer: Mutex::new(Box::new(source)),
        retained: Arc::new(AtomicUsize::new(0)),
        mobile_count,
        fixed,
        step_us,
    });
    let head = Link::new();

    iter_pairs(node_count)
        .map(|pair| {
            let view = DistanceView {
                shared: Arc::clone(&shared),
                pair,
                cursor: Arc::clone(&head),
                position: 0,
                done: false,
            };
            (pair, view)
        })
        .collect()
}
