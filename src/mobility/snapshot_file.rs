//! Replay of recorded position traces.
//!
//! File format: JSON lines, one snapshot per line, each a JSON array of
//! positions indexed by node (`[[x, y], [x, y], ...]`). Blank lines are
//! skipped. The node count is taken from the first snapshot.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use super::position::{Point, PositionSource, Snapshot};
use crate::common::{FeedError, Result};

/// Buffer size for reading trace files (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Position Source backed by a recorded JSON-lines file.
pub struct SnapshotFile<R = BufReader<File>> {
    reader: R,
    origin: PathBuf,
    node_count: usize,
    pending: Option<Snapshot>,
    line_buffer: String,
    line_number: usize,
    failed: bool,
}

impl SnapshotFile {
    /// Open a trace file and read its first snapshot to learn the node count.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| FeedError::Source(format!("Failed to open {}: {}", path.display(), e)))?;
        Self::from_reader(BufReader::with_capacity(BUFFER_SIZE, file), path)
    }
}

impl<R: BufRead + Send> SnapshotFile<R> {
    /// Build a source from any buffered reader. `origin` only labels errors.
    pub fn from_reader(reader: R, origin: &Path) -> Result<Self> {
        let mut source = Self {
            reader,
            origin: origin.to_path_buf(),
            node_count: 0,
            pending: None,
            line_buffer: String::with_capacity(1024),
            line_number: 0,
            failed: false,
        };
        let first = source
            .read_snapshot()
            .ok_or_else(|| FeedError::Source(format!("{} contains no snapshots", source.origin.display())))??;
        source.node_count = first.node_count();
        source.pending = Some(first);
        Ok(source)
    }

    fn read_snapshot(&mut self) -> Option<Result<Snapshot>> {
        loop {
            self.line_buffer.clear();
            self.line_number += 1;
            match self.reader.read_line(&mut self.line_buffer) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = self.line_buffer.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let parsed = serde_json::from_str::<Vec<Point>>(line)
                        .map(Snapshot::new)
                        .map_err(|e| FeedError::Source(format!("{}:{}: {}", self.origin.display(), self.line_number, e)));
                    return Some(parsed);
                }
                Err(e) => {
                    return Some(Err(FeedError::Source(format!("{}:{}: {}", self.origin.display(), self.line_number, e))));
                }
            }
        }
    }
}

impl<R: BufRead + Send> PositionSource for SnapshotFile<R> {
    fn node_count(&self) -> usize {
        self.node_count
    }

    fn next_snapshot(&mut self) -> Option<Result<Snapshot>> {
        if self.failed {
            return None;
        }
        if let Some(snapshot) = self.pending.take() {
            return Some(Ok(snapshot));
        }
        let next = match self.read_snapshot()? {
            Ok(snapshot) if snapshot.node_count() != self.node_count => Err(FeedError::Source(format!(
                "{}:{}: snapshot has {} positions, expected {}",
                self.origin.display(),
                self.line_number,
                snapshot.node_count(),
                self.node_count
            ))),
            other => other,
        };
        if next.is_err() {
            self.failed = true;
        }
        Some(next)
    }
}
