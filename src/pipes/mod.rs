//! Pipe Registry and Handshake.
//!
//! - `fifo`: named pipe creation, non-blocking open and write classification
//! - `control`: the control channel listing every pair's data channel
//! - `handshake`: per-pair open with retry and synchronous priming

pub mod control;
pub mod fifo;
pub mod handshake;

pub use control::{CONTROL_HEADER, ControlChannel, create_control_channel};
pub use fifo::{DataChannel, WriteOutcome, create_fifo};
pub use handshake::{PrimeOutcome, attach_writer, open_data_channel, prime};
