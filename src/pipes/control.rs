//! Control channel publishing the pair list to the consumer.
//!
//! Layout: one header comment line, then one descriptor line per pair in
//! channel order:
//!
//! ```text
//! #<Txnbr> <Rxnbr> : {<distance>|"<distance_file_name>"}
//! 1 0 "/tmp/feed/1-0.dist"
//! 2 0 "/tmp/feed/2-0.dist"
//! 2 1 "/tmp/feed/2-1.dist"
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::fifo::create_fifo;
use crate::common::{FeedError, PairKey, Result};

/// Header comment written before any descriptor line.
pub const CONTROL_HEADER: &str = "#<Txnbr> <Rxnbr> : {<distance>|\"<distance_file_name>\"}\n";

/// Write handle on the control channel.
pub struct ControlChannel<W = File> {
    writer: W,
    path: PathBuf,
    header_written: bool,
    descriptors: usize,
}

impl ControlChannel<File> {
    /// Open an existing control FIFO for writing.
    ///
    /// Blocks until the consumer opens the read end; returning from here is
    /// the signal that the consumer is ready for the pair list.
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Waiting for consumer to open control channel {}", path.display());
        let file = OpenOptions::new().write(true).open(path).map_err(|e| FeedError::OpenChannel {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::info!("Consumer attached to control channel");
        Ok(Self::new(file, path.to_path_buf()))
    }
}

impl<W: Write> ControlChannel<W> {
    /// Wrap any writer. `path` only labels errors.
    pub fn new(writer: W, path: PathBuf) -> Self {
        Self {
            writer,
            path,
            header_written: false,
            descriptors: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of descriptor lines written so far.
    pub fn descriptors(&self) -> usize {
        self.descriptors
    }

    /// Write the header comment. Later calls are no-ops.
    pub fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.write_line(CONTROL_HEADER)?;
        self.header_written = true;
        Ok(())
    }

    /// Write the descriptor line of one pair, writing the header first if needed.
    pub fn write_descriptor(&mut self, pair: PairKey, channel_path: &Path) -> Result<()> {
        self.write_header()?;
        let line = format!("{} {} \"{}\"\n", pair.a, pair.b, channel_path.display());
        self.write_line(&line)?;
        self.descriptors += 1;
        Ok(())
    }

    /// Write the header and every descriptor line in the given order.
    pub fn publish<'a, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (PairKey, &'a Path)>,
    {
        self.write_header()?;
        for (pair, channel_path) in pairs {
            self.write_descriptor(pair, channel_path)?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e: io::Error| FeedError::Write {
                path: self.path.clone(),
                source: e,
            })
    }
}

/// Create the control FIFO in `dir` and open it for writing.
///
/// Blocks until the consumer opens the read end.
pub fn create_control_channel(dir: &Path, file_name: &str) -> Result<ControlChannel<File>> {
    let path = dir.join(file_name);
    create_fifo(&path)?;
    ControlChannel::open(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::iter_pairs;
    use std::io::{BufRead, BufReader};
    use std::thread;

    #[test]
    fn three_nodes_publish_header_then_pairs_in_order() {
        let dir = PathBuf::from("/tmp/feed");
        let paths: Vec<(PairKey, PathBuf)> = iter_pairs(3).map(|p| (p, dir.join(p.channel_file_name()))).collect();

        let mut control = ControlChannel::new(Vec::new(), dir.join("distances.matrix"));
        control.publish(paths.iter().map(|(p, path)| (*p, path.as_path()))).unwrap();
        assert_eq!(control.descriptors(), 3);

        let text = String::from_utf8(control.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "#<Txnbr> <Rxnbr> : {<distance>|\"<distance_file_name>\"}",
                "1 0 \"/tmp/feed/1-0.dist\"",
                "2 0 \"/tmp/feed/2-0.dist\"",
                "2 1 \"/tmp/feed/2-1.dist\"",
            ]
        );
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn header_is_written_once() {
        let mut control = ControlChannel::new(Vec::new(), PathBuf::from("m"));
        control.write_header().unwrap();
        control.write_descriptor(PairKey { a: 1, b: 0 }, Path::new("/x/1-0.dist")).unwrap();
        let text = String::from_utf8(control.into_inner()).unwrap();
        assert_eq!(text.matches("#<Txnbr>").count(), 1);
    }

    #[test]
    fn open_blocks_until_consumer_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distances.matrix");
        create_fifo(&path).unwrap();

        let reader_path = path.clone();
        let consumer = thread::spawn(move || {
            let reader = BufReader::new(File::open(reader_path).unwrap());
            reader.lines().map(|l| l.unwrap()).collect::<Vec<String>>()
        });

        let mut control = ControlChannel::open(&path).unwrap();
        control.write_descriptor(PairKey { a: 1, b: 0 }, Path::new("/x/1-0.dist")).unwrap();
        drop(control);

        let lines = consumer.join().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1 0 \"/x/1-0.dist\"");
    }
}
