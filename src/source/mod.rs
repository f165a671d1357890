//! Data sources for the producer loop
//!
//! A [`DataSource`] stages raw buffers for the attach loop. The engine
//! ships a framed-file implementation ([`FileSource`]) and an in-memory
//! scripted source for tests ([`SimSource`]); live DAQ protocols plug in
//! behind [`OnlineConnector`].
//!
//! # Read contract
//!
//! `read_next` returns:
//!
//! - `Ok(Some(buffer))` — a new buffer is staged
//! - `Ok(None)` — no data available right now; for a file this is current
//!   end-of-data (a live logger may still append), for an online source it
//!   is backpressure and the loop polls rather than busy-spins
//! - `Err(..)` — a byte-level read failure; the attach loop decides whether
//!   it is transient (file) or fatal (online)

pub mod file;
pub mod sim;

pub(crate) mod attach;

pub use file::{write_frame, FileSource, MAX_FRAME_BYTES};
pub use sim::{SimConnector, SimSource, SimStep};

use crate::error::Result;
use crate::types::RawBuffer;

/// A staged-buffer supplier driven by the producer loop
pub trait DataSource: Send {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Stage and return the next buffer, if any
    fn read_next(&mut self) -> Result<Option<RawBuffer>>;

    /// Release the underlying connection
    fn close(&mut self) {}
}

/// Negotiates connections to a live online source
///
/// `connect` runs on the attach caller's thread: a failed negotiation
/// surfaces as [`crate::error::SortError::Connect`] before any producer
/// context is started.
pub trait OnlineConnector: Send + Sync {
    fn connect(&self, source_id: &str) -> Result<Box<dyn DataSource>>;
}
