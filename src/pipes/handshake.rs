//! Per-pair channel open and priming.
//!
//! Both steps block the calling thread through fixed-delay retries: the
//! open waits for the consumer to attach a reader, the priming writes wait
//! for the kernel to accept the first samples.

use std::path::Path;
use std::thread;

use super::fifo::{DataChannel, WriteOutcome, create_fifo, try_open_writer};
use crate::common::{DistanceSample, FeedError, PairKey, Result, RetryPolicy};

/// Create the FIFO for `pair` and open it for non-blocking writes.
///
/// Shorthand for [`create_fifo`] followed by [`attach_writer`], for callers
/// that do not need to publish the path in between.
pub fn open_data_channel(pair: PairKey, path: &Path, policy: RetryPolicy, buffer_size: Option<usize>) -> Result<DataChannel> {
    create_fifo(path)?;
    attach_writer(pair, path, policy, buffer_size)
}

/// Open the existing FIFO for `pair` for non-blocking writes.
///
/// Only "no reader yet" is retried, with `policy.delay` between attempts.
///
/// # Parameters
///
/// * `pair` - Pair owning the channel
/// * `path` - Location of the FIFO
/// * `policy` - Retry cadence and optional attempt budget
/// * `buffer_size` - Kernel pipe buffer size to apply once open
///
/// # Returns
///
/// The open channel, or a fatal error (unexpected open error, exhausted
/// attempt budget).
pub fn attach_writer(pair: PairKey, path: &Path, policy: RetryPolicy, buffer_size: Option<usize>) -> Result<DataChannel> {
    let mut attempts: u32 = 0;
    loop {
        match try_open_writer(path) {
            Ok(Some(file)) => {
                log::debug!("Opened channel {} for pair {} after {} retries", path.display(), pair, attempts);
                return Ok(DataChannel::new(pair, path.to_path_buf(), file, buffer_size));
            }
            Ok(None) => {
                attempts += 1;
                if !policy.allows(attempts) {
                    return Err(FeedError::RetriesExhausted {
                        path: path.to_path_buf(),
                        attempts,
                    });
                }
                log::trace!("No reader on {} yet, retrying", path.display());
                thread::sleep(policy.delay);
            }
            Err(e) => {
                return Err(FeedError::OpenChannel {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }
}

/// Outcome of priming one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimeOutcome {
    /// All requested samples were written.
    Primed(usize),
    /// The distance stream ended after this many samples.
    SourceEnded(usize),
    /// The reader closed the channel after this many samples.
    ReaderClosed(usize),
}

/// Synchronously write the first `count` samples of `samples` to `channel`.
///
/// A full pipe is retried with `policy.delay`; a closed reader is reported
/// as [`PrimeOutcome::ReaderClosed`] so the caller can retire the pair.
pub fn prime<I>(channel: &mut DataChannel, samples: &mut I, count: usize, policy: RetryPolicy) -> Result<PrimeOutcome>
where
    I: Iterator<Item = DistanceSample>,
{
    for written in 0..count {
        let Some(sample) = samples.next() else {
            return Ok(PrimeOutcome::SourceEnded(written));
        };
        let line = sample.to_line();
        let bytes = line.as_bytes();
        let mut offset = 0;
        let mut attempts: u32 = 0;

        while offset < bytes.len() {
            match channel.try_write(&bytes[offset..]) {
                WriteOutcome::Written(n) => offset += n,
                WriteOutcome::Full => {
                    attempts += 1;
                    if !policy.allows(attempts) {
                        return Err(FeedError::RetriesExhausted {
                            path: channel.path().to_path_buf(),
                            attempts,
                        });
                    }
                    thread::sleep(policy.delay);
                }
                WriteOutcome::Closed => {
                    log::warn!("Reader closed {} during priming", channel.path().display());
                    return Ok(PrimeOutcome::ReaderClosed(written));
                }
                WriteOutcome::Failed(e) => {
                    return Err(FeedError::Write {
                        path: channel.path().to_path_buf(),
                        source: e,
                    });
                }
            }
        }
    }
    Ok(PrimeOutcome::Primed(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::{BufRead, BufReader};
    use std::os::unix::fs::OpenOptionsExt;
    use std::time::Duration;

    fn samples(n: u64) -> impl Iterator<Item = DistanceSample> {
        (0..n).map(|k| DistanceSample {
            timestamp_us: k * 1_000_000,
            distance: k as f64,
        })
    }

    #[test]
    fn open_gives_up_after_attempt_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-0.dist");
        let policy = RetryPolicy {
            delay: Duration::from_millis(1),
            max_attempts: Some(3),
        };
        let result = open_data_channel(PairKey { a: 1, b: 0 }, &path, policy, None);
        assert!(matches!(result, Err(FeedError::RetriesExhausted { attempts: 3, .. })));
    }

    #[test]
    fn open_waits_for_late_reader_then_primes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-0.dist");
        create_fifo(&path).unwrap();

        let reader_path = path.clone();
        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let reader = BufReader::new(File::open(reader_path).unwrap());
            reader.lines().map(|l| l.unwrap()).collect::<Vec<String>>()
        });

        let policy = RetryPolicy::forever(Duration::from_millis(5));
        let mut channel = open_data_channel(PairKey { a: 1, b: 0 }, &path, policy, Some(4096)).unwrap();
        let mut stream = samples(10);
        assert_eq!(prime(&mut channel, &mut stream, 2, policy).unwrap(), PrimeOutcome::Primed(2));
        drop(channel);

        let lines = reader.join().unwrap();
        assert_eq!(lines, vec!["0 0.000000e+000", "1000000 1.000000e+000"]);
        assert_eq!(stream.next().unwrap().timestamp_us, 2_000_000);
    }

    #[test]
    fn prime_reports_short_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-0.dist");
        create_fifo(&path).unwrap();

        let reader_path = path.clone();
        let reader = thread::spawn(move || BufReader::new(File::open(reader_path).unwrap()).lines().count());

        let policy = RetryPolicy::forever(Duration::from_millis(5));
        let mut channel = open_data_channel(PairKey { a: 1, b: 0 }, &path, policy, None).unwrap();
        assert_eq!(prime(&mut channel, &mut samples(1), 3, policy).unwrap(), PrimeOutcome::SourceEnded(1));
        drop(channel);
        assert_eq!(reader.join().unwrap(), 1);
    }

    #[test]
    fn attach_fails_when_fifo_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-0.dist");
        let result = attach_writer(PairKey { a: 1, b: 0 }, &path, RetryPolicy::forever(Duration::from_millis(1)), None);
        assert!(matches!(result, Err(FeedError::OpenChannel { .. })));
    }

    #[test]
    fn prime_reports_reader_closed_before_first_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2-1.dist");
        create_fifo(&path).unwrap();

        // A non-blocking read open succeeds without a writer, so the reader
        // can be attached and dropped again around the writer's open.
        let reader = OpenOptions::new().read(true).custom_flags(libc::O_NONBLOCK).open(&path).unwrap();
        let policy = RetryPolicy::forever(Duration::from_millis(1));
        let mut channel = attach_writer(PairKey { a: 2, b: 1 }, &path, policy, None).unwrap();
        drop(reader);

        let mut stream = samples(5);
        assert_eq!(prime(&mut channel, &mut stream, 2, policy).unwrap(), PrimeOutcome::ReaderClosed(0));
        assert_eq!(stream.next().unwrap().timestamp_us, 1_000_000);
    }
}
