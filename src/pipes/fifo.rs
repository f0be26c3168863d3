//! Named pipe primitives.
//!
//! Data channels are opened with `O_NONBLOCK` for writing. On Linux such an
//! open fails with `ENXIO` while no reader has the FIFO open, and a write
//! into a full pipe fails with `EAGAIN` instead of blocking the thread.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use crate::common::{FeedError, PairKey, Result};

/// Permissions for created FIFOs (owner read/write).
const FIFO_MODE: libc::mode_t = 0o600;

/// Create a named pipe at `path`.
///
/// An existing FIFO at the same path is accepted; any other failure is fatal
/// since channel identities are fixed for the run.
pub fn create_fifo(path: &Path) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|e| FeedError::CreateChannel {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE) };
    if rc == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::AlreadyExists {
        let is_fifo = std::fs::metadata(path).map(|m| m.file_type().is_fifo()).unwrap_or(false);
        if is_fifo {
            log::debug!("Reusing existing FIFO {}", path.display());
            return Ok(());
        }
    }
    Err(FeedError::CreateChannel {
        path: path.to_path_buf(),
        source: err,
    })
}

/// True for the error a non-blocking writer open reports while no reader is attached.
pub fn is_no_reader(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENXIO)
}

/// Single non-blocking attempt to open the write end of a FIFO.
///
/// # Returns
///
/// * `Ok(Some(file))` once a reader is attached
/// * `Ok(None)` if no reader is attached yet
/// * `Err` for anything else
pub fn try_open_writer(path: &Path) -> io::Result<Option<File>> {
    match OpenOptions::new().write(true).custom_flags(libc::O_NONBLOCK).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if is_no_reader(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Resize the kernel buffer of a pipe.
#[cfg(target_os = "linux")]
pub fn set_pipe_size(file: &File, size: usize) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let size = libc::c_int::try_from(size).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: the descriptor is owned by `file` and stays open for the call.
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETPIPE_SZ, size) };
    if rc < 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
}

#[cfg(not(target_os = "linux"))]
pub fn set_pipe_size(_file: &File, _size: usize) -> io::Result<()> {
    Ok(())
}

/// Result of one non-blocking write attempt.
#[derive(Debug)]
pub enum WriteOutcome {
    /// This many bytes were accepted.
    Written(usize),
    /// The pipe buffer is full; retry later.
    Full,
    /// The reader closed its end; the channel is permanently gone.
    Closed,
    /// Any other I/O error.
    Failed(io::Error),
}

impl WriteOutcome {
    fn classify(result: io::Result<usize>) -> Self {
        match result {
            Ok(n) => WriteOutcome::Written(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => WriteOutcome::Full,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => WriteOutcome::Closed,
            Err(e) => WriteOutcome::Failed(e),
        }
    }
}

/// The open write end of one pair's data channel.
#[derive(Debug)]
pub struct DataChannel {
    pair: PairKey,
    path: PathBuf,
    file: File,
}

impl DataChannel {
    /// Wrap an open FIFO, applying the configured buffer size.
    ///
    /// A buffer size the kernel refuses is logged and otherwise ignored.
    pub fn new(pair: PairKey, path: PathBuf, file: File, buffer_size: Option<usize>) -> Self {
        if let Some(size) = buffer_size {
            if let Err(e) = set_pipe_size(&file, size) {
                log::warn!("Could not set pipe size {} on {}: {}", size, path.display(), e);
            }
        }
        Self { pair, path, file }
    }

    pub fn pair(&self) -> PairKey {
        self.pair
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempt one non-blocking write of `bytes`.
    pub fn try_write(&mut self, bytes: &[u8]) -> WriteOutcome {
        WriteOutcome::classify(self.file.write(bytes))
    }
}
