//! Startup sequence and steady-state delivery.
//!
//! 1) Create the control FIFO and wait for the consumer to open it.
//! 2) For each pair in channel order: create its FIFO, publish its
//!    descriptor line, open it (retrying until a reader attaches) and prime
//!    it. Descriptor lines are interleaved with the opens so a consumer that
//!    opens each data channel right after reading its line never deadlocks
//!    against a full control pipe.
//! 3) Close the control channel and hand every primed channel to the
//!    delivery pool.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::common::{FeedConfig, FeedError, PairKey, Result, pair_count};
use crate::delivery::{ChannelState, DeliveryHandle, DeliveryPool, DeliveryReport, PairFeed, PairOutcome, PairReport, PoolConfig};
use crate::fanout::derive_with_fixed;
use crate::mobility::{FixedDistances, PositionSource};
use crate::pipes::{PrimeOutcome, attach_writer, create_control_channel, create_fifo, prime};

/// Number of progress lines logged while priming.
const PRIMING_PROGRESS_STEPS: usize = 20;

enum PipeDir {
    Temporary(TempDir),
    Fixed(PathBuf),
}

/// Owns the pipe directory and drives one feed run.
pub struct Engine {
    config: FeedConfig,
    dir: PipeDir,
}

impl Engine {
    /// Validate `config` and prepare the pipe directory.
    ///
    /// Without a configured `pipe-dir` a temporary directory is created and
    /// removed again when the engine is dropped.
    pub fn new(config: FeedConfig) -> Result<Self> {
        config.validate()?;
        let dir = match &config.pipe_dir {
            Some(path) => {
                std::fs::create_dir_all(path).map_err(|e| FeedError::CreateChannel {
                    path: path.clone(),
                    source: e,
                })?;
                PipeDir::Fixed(path.clone())
            }
            None => {
                let temp = tempfile::Builder::new().prefix("distfeed-").tempdir().map_err(|e| FeedError::CreateChannel {
                    path: std::env::temp_dir(),
                    source: e,
                })?;
                PipeDir::Temporary(temp)
            }
        };
        Ok(Self { config, dir })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn pipe_dir(&self) -> &Path {
        match &self.dir {
            PipeDir::Temporary(temp) => temp.path(),
            PipeDir::Fixed(path) => path,
        }
    }

    /// Path the consumer has to open to receive the pair list.
    pub fn control_path(&self) -> PathBuf {
        self.pipe_dir().join(&self.config.control_file_name)
    }

    pub fn channel_path(&self, pair: PairKey) -> PathBuf {
        self.pipe_dir().join(pair.channel_file_name())
    }

    /// Run the handshake and start steady-state delivery.
    ///
    /// Blocks until the consumer has opened the control channel and every
    /// data channel has been opened and primed.
    ///
    /// # Parameters
    ///
    /// * `source` - Position Source for the mobile (and fixed-position) nodes
    /// * `fixed` - Fixed-distance nodes appended after the source's nodes
    ///
    /// # Returns
    ///
    /// A handle on the running delivery pool, or the fatal startup error.
    pub fn start<S>(&self, source: S, fixed: FixedDistances) -> Result<DeliveryHandle>
    where
        S: PositionSource + 'static,
    {
        let node_count = source.node_count() + fixed.len();
        let total = pair_count(node_count);
        log::info!("Starting distance feed: {} nodes, {} channels in {}", node_count, total, self.pipe_dir().display());

        let views = derive_with_fixed(source, fixed, self.config.step_us);
        let policy = self.config.retry_policy();
        let prime_count = self.config.effective_prime_count();
        let progress_every = (total / PRIMING_PROGRESS_STEPS).max(1);

        let mut control = create_control_channel(self.pipe_dir(), &self.config.control_file_name)?;
        control.write_header()?;

        let mut feeds = Vec::with_capacity(total);
        let mut retired = Vec::new();
        for (i, (pair, mut view)) in views.into_iter().enumerate() {
            let path = self.channel_path(pair);
            create_fifo(&path)?;
            control.write_descriptor(pair, &path)?;

            let mut channel = attach_writer(pair, &path, policy, self.config.pipe_buffer_size)?;
            match prime(&mut channel, &mut view, prime_count, policy)? {
                PrimeOutcome::Primed(n) | PrimeOutcome::SourceEnded(n) => feeds.push(PairFeed {
                    pair,
                    view,
                    channel: ChannelState::Open(channel),
                    delivered: n as u64,
                }),
                PrimeOutcome::ReaderClosed(n) => retired.push((
                    pair,
                    PairReport {
                        delivered: n as u64,
                        outcome: PairOutcome::ReaderClosed,
                    },
                )),
            }

            let done = i + 1;
            if done % progress_every == 0 || done == total {
                log::info!("Primed {}/{} channels", done, total);
            }
        }
        drop(control);
        log::info!("Control channel closed, {} channels handed to delivery", feeds.len());

        let mut handle = DeliveryPool::spawn(feeds, PoolConfig::from_feed_config(&self.config, node_count))?;
        for (pair, report) in retired {
            handle.record(pair, report);
        }
        Ok(handle)
    }

    /// [`Engine::start`] followed by waiting for the pool to finish.
    pub fn run<S>(&self, source: S, fixed: FixedDistances) -> Result<DeliveryReport>
    where
        S: PositionSource + 'static,
    {
        let report = self.start(source, fixed)?.join();
        log::info!(
            "Delivery finished: {} samples, {} pairs exhausted, {} closed by reader",
            report.delivered(),
            report.with_outcome(&PairOutcome::Exhausted).len(),
            report.with_outcome(&PairOutcome::ReaderClosed).len()
        );
        Ok(report)
    }
}
