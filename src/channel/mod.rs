//! Line channel abstraction over one open serial port.
//!
//! Opening a channel yields an [`OpenChannel`]: a stream of delimited lines
//! produced by a background framing task, an async writer handle, and the
//! read task's join handle for hard cancellation. The [`ChannelFactory`]
//! trait is the injection seam between the supervisor and the transport,
//! letting tests substitute a scripted mock for real hardware.

pub mod error;
pub mod mock;
pub mod serial;

pub use error::ChannelError;
pub use mock::{MockChannelControl, MockChannelFactory};
pub use serial::SerialChannelFactory;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the per-channel line queue. Lines beyond this apply
/// backpressure to the read task rather than growing without bound.
pub const LINE_QUEUE_CAPACITY: usize = 64;

/// One framed event from a channel's read task.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A complete delimited line, delimiter stripped.
    Line(String),
    /// The channel closed. `None` means a clean end of stream.
    Closed(Option<ChannelError>),
}

/// Write half of an open channel.
#[async_trait]
pub trait ChannelWriter: Send {
    /// Write the full buffer to the port. Returns the number of bytes written.
    async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError>;

    /// Flush and shut down the write half.
    async fn shutdown(&mut self) -> Result<(), ChannelError>;
}

/// An open, framed serial channel.
///
/// The read task owns the receive half and pushes [`ChannelEvent`]s into
/// `lines` in arrival order. Exactly one `OpenChannel` exists per physical
/// port at any time (supervisor invariant).
pub struct OpenChannel {
    /// Path of the underlying port.
    pub path: String,
    /// FIFO stream of framed events from the read task.
    pub lines: mpsc::Receiver<ChannelEvent>,
    /// Writer handle for outbound bytes.
    pub writer: Box<dyn ChannelWriter>,
    /// Read task handle. `None` for mock channels driven externally.
    pub reader_task: Option<JoinHandle<()>>,
}

impl OpenChannel {
    /// Fully close the channel: abort the read task, then shut the writer
    /// down. Both halves are dropped before this returns, so a subsequent
    /// open never races an old handle.
    pub async fn close(mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        let _ = self.writer.shutdown().await;
    }
}

impl std::fmt::Debug for OpenChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenChannel")
            .field("path", &self.path)
            .finish()
    }
}

/// Opens line channels on demand.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    /// Open the port at `path` and start framing lines on `delimiter`.
    ///
    /// The open itself carries no deadline; the caller wraps it in a
    /// timeout and drops the future to cancel.
    async fn open(
        &self,
        path: &str,
        baud_rate: u32,
        delimiter: &[u8],
    ) -> Result<OpenChannel, ChannelError>;
}
