//! Delivery worker.
//!
//! Every pair owned by a worker has a single-slot cache holding the next
//! line not yet fully written. One pass over the subset:
//!
//! 1. opens channels that are still waiting for a reader (non-blocking),
//! 2. refills empty slots from the pair's distance stream,
//! 3. attempts one non-blocking write per filled slot.
//!
//! The worker only sleeps after a pass in which nothing was written.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::common::PairKey;
use crate::fanout::DistanceView;
use crate::pipes::fifo::try_open_writer;
use crate::pipes::{DataChannel, WriteOutcome};

/// Channel state a pair enters the pool with.
#[derive(Debug)]
pub enum ChannelState {
    /// The FIFO exists but no reader has attached yet.
    Pending(PathBuf),
    /// Open for non-blocking writes (normally already primed).
    Open(DataChannel),
}

/// Everything the pool needs to serve one pair.
pub struct PairFeed {
    pub pair: PairKey,
    pub view: DistanceView,
    pub channel: ChannelState,
    /// Samples already written before the pool took over (priming).
    pub delivered: u64,
}

/// How a pair left the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// The distance stream ended and every sample was written.
    Exhausted,
    /// The reader closed its end of the channel.
    ReaderClosed,
    /// Open or write failed with an unexpected I/O error.
    Failed(String),
    /// The pool was stopped while the pair was still active.
    Stopped,
}

/// Final accounting for one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairReport {
    pub delivered: u64,
    pub outcome: PairOutcome,
}

struct PendingLine {
    bytes: Vec<u8>,
    offset: usize,
}

struct Slot {
    pair: PairKey,
    view: DistanceView,
    channel: ChannelState,
    line: Option<PendingLine>,
    delivered: u64,
    finished: Option<PairOutcome>,
}

impl Slot {
    fn new(feed: PairFeed) -> Self {
        Self {
            pair: feed.pair,
            view: feed.view,
            channel: feed.channel,
            line: None,
            delivered: feed.delivered,
            finished: None,
        }
    }

    fn open_if_pending(&mut self, buffer_size: Option<usize>) {
        let ChannelState::Pending(path) = &self.channel else {
            return;
        };
        match try_open_writer(path) {
            Ok(Some(file)) => {
                log::debug!("Reader attached to {} for pair {}", path.display(), self.pair);
                self.channel = ChannelState::Open(DataChannel::new(self.pair, path.clone(), file, buffer_size));
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("Retiring pair {}: cannot open {}: {}", self.pair, path.display(), e);
                self.finished = Some(PairOutcome::Failed(e.to_string()));
            }
        }
    }

    fn refill(&mut self) {
        if self.line.is_some() {
            return;
        }
        match self.view.next() {
            Some(sample) => {
                self.line = Some(PendingLine {
                    bytes: sample.to_line().into_bytes(),
                    offset: 0,
                })
            }
            None => {
                log::debug!("Pair {} exhausted after {} samples", self.pair, self.delivered);
                self.finished = Some(PairOutcome::Exhausted);
            }
        }
    }

    /// Attempt one write. Returns true if any bytes were accepted.
    fn write(&mut self) -> bool {
        let (ChannelState::Open(channel), Some(line)) = (&mut self.channel, &mut self.line) else {
            return false;
        };
        match channel.try_write(&line.bytes[line.offset..]) {
            WriteOutcome::Written(n) => {
                line.offset += n;
                if line.offset >= line.bytes.len() {
                    self.line = None;
                    self.delivered += 1;
                }
                n > 0
            }
            WriteOutcome::Full => false,
            WriteOutcome::Closed => {
                log::warn!("Reader closed channel for pair {}, retiring after {} samples", self.pair, self.delivered);
                self.finished = Some(PairOutcome::ReaderClosed);
                false
            }
            WriteOutcome::Failed(e) => {
                log::error!("Retiring pair {}: write to {} failed: {}", self.pair, channel.path().display(), e);
                self.finished = Some(PairOutcome::Failed(e.to_string()));
                false
            }
        }
    }

    fn report(self, outcome: PairOutcome) -> (PairKey, PairReport) {
        (
            self.pair,
            PairReport {
                delivered: self.delivered,
                outcome,
            },
        )
    }
}

/// Worker-local settings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerSettings {
    pub idle_delay: Duration,
    pub buffer_size: Option<usize>,
}

/// Serve `feeds` until every pair is exhausted or retired, or `stop` is raised.
pub(crate) fn run_worker(index: usize, feeds: Vec<PairFeed>, settings: WorkerSettings, stop: Arc<AtomicBool>) -> Vec<(PairKey, PairReport)> {
    let mut active: Vec<Slot> = feeds.into_iter().map(Slot::new).collect();
    let mut reports = Vec::with_capacity(active.len());
    log::debug!("Delivery worker {} serving {} pairs", index, active.len());

    while !active.is_empty() {
        if stop.load(Ordering::Relaxed) {
            reports.extend(active.drain(..).map(|slot| slot.report(PairOutcome::Stopped)));
            break;
        }

        for slot in active.iter_mut() {
            slot.open_if_pending(settings.buffer_size);
        }
        for slot in active.iter_mut().filter(|s| s.finished.is_none()) {
            slot.refill();
        }
        let mut writes = 0usize;
        for slot in active.iter_mut().filter(|s| s.finished.is_none()) {
            if slot.write() {
                writes += 1;
            }
        }

        // Retire finished pairs; dropping the slot closes its channel and releases its view.
        let mut i = 0;
        while i < active.len() {
            if let Some(outcome) = active[i].finished.take() {
                let slot = active.swap_remove(i);
                reports.push(slot.report(outcome));
            } else {
                i += 1;
            }
        }

        if writes == 0 && !active.is_empty() {
            thread::sleep(settings.idle_delay);
        }
    }

    log::debug!("Delivery worker {} finished", index);
    reports
}
