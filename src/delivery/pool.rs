//! Worker pool lifecycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::worker::{PairFeed, PairOutcome, PairReport, WorkerSettings, run_worker};
use crate::common::{FeedConfig, FeedError, PairKey, Result};

/// Settings for one pool run.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of worker threads; clamped to the pair count and at least 1.
    pub workers: usize,
    /// Sleep after a pass that wrote nothing.
    pub idle_delay: Duration,
    /// Kernel buffer size for channels opened inside the pool.
    pub buffer_size: Option<usize>,
}

impl PoolConfig {
    /// Derive the pool settings for a run with `node_count` nodes.
    pub fn from_feed_config(config: &FeedConfig, node_count: usize) -> Self {
        Self {
            workers: config.worker_count(node_count),
            idle_delay: config.idle_delay(),
            buffer_size: config.pipe_buffer_size,
        }
    }
}

/// Per-pair results of a finished pool.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub pairs: BTreeMap<PairKey, PairReport>,
}

impl DeliveryReport {
    /// Total samples written across all pairs, priming included.
    pub fn delivered(&self) -> u64 {
        self.pairs.values().map(|r| r.delivered).sum()
    }

    /// Pairs that left the pool with the given outcome.
    pub fn with_outcome(&self, outcome: &PairOutcome) -> Vec<PairKey> {
        self.pairs.iter().filter(|(_, r)| &r.outcome == outcome).map(|(p, _)| *p).collect()
    }
}

/// Running pool. Dropping it without `join` detaches the workers.
pub struct DeliveryHandle {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<Vec<(PairKey, PairReport)>>>,
    /// Pairs retired before the pool started (e.g. reader gone during priming).
    recorded: Vec<(PairKey, PairReport)>,
}

impl DeliveryHandle {
    /// Ask every worker to stop after its current pass.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// True once every worker has returned.
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(|w| w.is_finished())
    }

    pub(crate) fn record(&mut self, pair: PairKey, report: PairReport) {
        self.recorded.push((pair, report));
    }

    /// Wait for all workers and collect their reports.
    pub fn join(self) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        report.pairs.extend(self.recorded);
        for (index, worker) in self.workers.into_iter().enumerate() {
            match worker.join() {
                Ok(pairs) => report.pairs.extend(pairs),
                Err(_) => log::error!("Delivery worker {} panicked", index),
            }
        }
        report
    }
}

/// Spawns and partitions delivery workers.
pub struct DeliveryPool;

impl DeliveryPool {
    /// Partition `feeds` round-robin over the workers, in channel order, and start them.
    ///
    /// # Parameters
    ///
    /// * `feeds` - One entry per pair; a pair is never handed to two workers
    /// * `config` - Worker count and pacing
    ///
    /// # Returns
    ///
    /// A handle for stopping and joining the pool.
    pub fn spawn(mut feeds: Vec<PairFeed>, config: PoolConfig) -> Result<DeliveryHandle> {
        feeds.sort_by_key(|f| f.pair);
        let workers = config.workers.min(feeds.len()).max(1);

        let mut partitions: Vec<Vec<PairFeed>> = (0..workers).map(|_| Vec::new()).collect();
        for (i, feed) in feeds.into_iter().enumerate() {
            partitions[i % workers].push(feed);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let settings = WorkerSettings {
            idle_delay: config.idle_delay,
            buffer_size: config.buffer_size,
        };

        log::info!("Starting {} delivery workers", workers);
        let mut handles = Vec::with_capacity(workers);
        for (index, partition) in partitions.into_iter().enumerate() {
            let worker_stop = Arc::clone(&stop);
            let spawned = thread::Builder::new()
                .name(format!("distfeed-worker-{}", index))
                .spawn(move || run_worker(index, partition, settings, worker_stop));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    stop.store(true, Ordering::Relaxed);
                    return Err(FeedError::Spawn(e));
                }
            }
        }

        Ok(DeliveryHandle {
            stop,
            workers: handles,
            recorded: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::iter_pairs;
    use crate::delivery::ChannelState;
    use crate::fanout::derive;
    use crate::mobility::{IterSource, Point, Snapshot};
    use crate::pipes::create_fifo;
    use std::fs::File;
    use std::io::{BufRead, BufReader, Read};
    use std::path::{Path, PathBuf};
    use std::time::Instant;

    /// Node `i` at `(i * (t + 1), 0)`, so pair `(a, b)` is `(a - b) * (t + 1)` apart.
    fn linear_source(nodes: usize, steps: usize) -> IterSource<std::vec::IntoIter<Snapshot>> {
        let snapshots: Vec<Snapshot> = (0..steps)
            .map(|t| Snapshot::new((0..nodes).map(|i| Point::new(i as f64 * (t as f64 + 1.0), 0.0)).collect()))
            .collect();
        IterSource::new(nodes, snapshots.into_iter())
    }

    fn pending_feeds(dir: &Path, nodes: usize, steps: usize) -> Vec<(PairFeed, PathBuf)> {
        derive(linear_source(nodes, steps), 1_000_000)
            .into_iter()
            .map(|(pair, view)| {
                let path = dir.join(pair.channel_file_name());
                create_fifo(&path).unwrap();
                let feed = PairFeed {
                    pair,
                    view,
                    channel: ChannelState::Pending(path.clone()),
                    delivered: 0,
                };
                (feed, path)
            })
            .collect()
    }

    fn read_all(path: PathBuf) -> thread::JoinHandle<Vec<String>> {
        thread::spawn(move || BufReader::new(File::open(path).unwrap()).lines().map(|l| l.unwrap()).collect())
    }

    fn test_config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            idle_delay: Duration::from_millis(1),
            buffer_size: Some(4096),
        }
    }

    #[test]
    fn every_pair_is_drained_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (feeds, paths): (Vec<PairFeed>, Vec<PathBuf>) = pending_feeds(dir.path(), 4, 300).into_iter().unzip();
        let readers: Vec<_> = paths.into_iter().map(read_all).collect();

        let report = DeliveryPool::spawn(feeds, test_config(3)).unwrap().join();

        for (reader, pair) in readers.into_iter().zip(iter_pairs(4)) {
            let lines = reader.join().unwrap();
            assert_eq!(lines.len(), 300);
            assert_eq!(lines[0], format!("0 {}", crate::common::format_distance((pair.a - pair.b) as f64)));
            let timestamps: Vec<u64> = lines.iter().map(|l| l.split(' ').next().unwrap().parse().unwrap()).collect();
            assert!(timestamps.windows(2).all(|w| w[1] == w[0] + 1_000_000));
        }
        assert_eq!(report.pairs.len(), 6);
        assert_eq!(report.with_outcome(&PairOutcome::Exhausted).len(), 6);
        assert_eq!(report.delivered(), 6 * 300);
    }

    #[test]
    fn stuck_pair_does_not_starve_live_pairs() {
        let dir = tempfile::tempdir().unwrap();
        // 5 nodes give 10 pairs; the first pair never gets a reader.
        let (feeds, paths): (Vec<PairFeed>, Vec<PathBuf>) = pending_feeds(dir.path(), 5, 200).into_iter().unzip();
        let stuck = feeds[0].pair;
        let readers: Vec<_> = paths.into_iter().skip(1).map(read_all).collect();

        let handle = DeliveryPool::spawn(feeds, test_config(2)).unwrap();

        for reader in readers {
            assert_eq!(reader.join().unwrap().len(), 200);
        }
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        handle.stop();
        let report = handle.join();
        assert_eq!(report.with_outcome(&PairOutcome::Exhausted).len(), 9);
        assert_eq!(report.pairs[&stuck], PairReport { delivered: 0, outcome: PairOutcome::Stopped });
    }

    #[test]
    fn closed_reader_retires_only_its_pair() {
        let dir = tempfile::tempdir().unwrap();
        let steps = 5_000;
        let (feeds, paths): (Vec<PairFeed>, Vec<PathBuf>) = pending_feeds(dir.path(), 3, steps).into_iter().unzip();
        let quitter = feeds[1].pair;

        let mut readers = Vec::new();
        for (i, path) in paths.into_iter().enumerate() {
            if i == 1 {
                readers.push(thread::spawn(move || {
                    let mut file = File::open(path).unwrap();
                    let mut buf = [0u8; 16];
                    file.read_exact(&mut buf).unwrap();
                    Vec::new()
                }));
            } else {
                readers.push(read_all(path));
            }
        }

        let started = Instant::now();
        let report = DeliveryPool::spawn(feeds, test_config(1)).unwrap().join();
        assert!(started.elapsed() < Duration::from_secs(30));

        for (i, reader) in readers.into_iter().enumerate() {
            let lines = reader.join().unwrap();
            if i != 1 {
                assert_eq!(lines.len(), steps);
            }
        }
        assert_eq!(report.pairs[&quitter].outcome, PairOutcome::ReaderClosed);
        assert!(report.pairs[&quitter].delivered < steps as u64);
        assert_eq!(report.with_outcome(&PairOutcome::Exhausted).len(), 2);
    }

    #[test]
    fn slow_reader_does_not_hold_back_other_pairs() {
        const STEPS: usize = 3_000;
        let dir = tempfile::tempdir().unwrap();
        // 8 nodes give 28 pairs over 3 workers; the first pair's reader is slow.
        let (feeds, paths): (Vec<PairFeed>, Vec<PathBuf>) = pending_feeds(dir.path(), 8, STEPS).into_iter().unzip();
        let readers: Vec<_> = paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                if i != 0 {
                    return read_all(path);
                }
                thread::spawn(move || {
                    BufReader::new(File::open(path).unwrap())
                        .lines()
                        .map(|l| {
                            thread::sleep(Duration::from_micros(300));
                            l.unwrap()
                        })
                        .collect()
                })
            })
            .collect();

        let report = DeliveryPool::spawn(feeds, test_config(3)).unwrap().join();

        for (reader, pair) in readers.into_iter().zip(iter_pairs(8)) {
            let lines = reader.join().unwrap();
            assert_eq!(lines.len(), STEPS, "pair {}", pair);
            for (k, line) in lines.iter().enumerate() {
                let distance = (pair.a - pair.b) as f64 * (k as f64 + 1.0);
                assert_eq!(*line, format!("{} {}", k as u64 * 1_000_000, crate::common::format_distance(distance)));
            }
        }
        assert_eq!(report.with_outcome(&PairOutcome::Exhausted).len(), 28);
        assert_eq!(report.delivered(), 28 * STEPS as u64);
    }

    #[test]
    fn recorded_pairs_are_part_of_the_report() {
        let config = PoolConfig {
            workers: 2,
            idle_delay: Duration::from_millis(1),
            buffer_size: None,
        };
        let mut handle = DeliveryPool::spawn(Vec::new(), config).unwrap();
        let pair = PairKey { a: 3, b: 1 };
        handle.record(
            pair,
            PairReport {
                delivered: 1,
                outcome: PairOutcome::ReaderClosed,
            },
        );

        let report = handle.join();
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.with_outcome(&PairOutcome::ReaderClosed), vec![pair]);
        assert_eq!(report.delivered(), 1);
    }
}
