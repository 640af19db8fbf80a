//! Real serial channel implementation using tokio-serial.
//!
//! Opens a `tokio_serial::SerialStream`, splits it, and runs a framing read
//! task that scans for the configured line delimiter with `memchr` and
//! forwards complete lines over an mpsc queue.

use super::error::ChannelError;
use super::{ChannelEvent, ChannelFactory, ChannelWriter, OpenChannel, LINE_QUEUE_CAPACITY};
use async_trait::async_trait;
use memchr::memmem;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

/// Read chunk size for the framing task.
const READ_CHUNK_SIZE: usize = 1024;

/// Ceiling on buffered bytes while waiting for a delimiter. A device
/// streaming garbage without delimiters gets its buffer discarded instead
/// of growing without bound.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// [`ChannelFactory`] backed by tokio-serial.
#[derive(Debug, Default, Clone)]
pub struct SerialChannelFactory;

impl SerialChannelFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelFactory for SerialChannelFactory {
    async fn open(
        &self,
        path: &str,
        baud_rate: u32,
        delimiter: &[u8],
    ) -> Result<OpenChannel, ChannelError> {
        let stream = tokio_serial::new(path, baud_rate)
            .open_native_async()
            .map_err(|e| match e.kind {
                tokio_serial::ErrorKind::NoDevice => ChannelError::not_found(path),
                _ => ChannelError::open(e.to_string()),
            })?;

        debug!(port = path, baud = baud_rate, "serial port opened");

        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
        let delimiter = delimiter.to_vec();
        let reader_path = path.to_string();
        let reader_task = tokio::spawn(async move {
            run_reader(read_half, delimiter, tx, reader_path).await;
        });

        Ok(OpenChannel {
            path: path.to_string(),
            lines: rx,
            writer: Box::new(SerialWriter { inner: write_half }),
            reader_task: Some(reader_task),
        })
    }
}

/// Write half of a split `SerialStream`.
struct SerialWriter {
    inner: WriteHalf<SerialStream>,
}

#[async_trait]
impl ChannelWriter for SerialWriter {
    async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(data.len())
    }

    async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Framing loop: accumulate bytes, split on `delimiter`, forward lines.
///
/// Exits when the port reaches EOF, errors, or the receiver side of the
/// queue is dropped (channel closed by the supervisor).
async fn run_reader(
    mut port: ReadHalf<SerialStream>,
    delimiter: Vec<u8>,
    tx: mpsc::Sender<ChannelEvent>,
    path: String,
) {
    let finder = memmem::Finder::new(&delimiter);
    let mut pending: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = match port.read(&mut chunk).await {
            Ok(0) => {
                debug!(port = %path, "serial port reached end of stream");
                let _ = tx.send(ChannelEvent::Closed(None)).await;
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(port = %path, error = %e, "serial read failed");
                let _ = tx.send(ChannelEvent::Closed(Some(ChannelError::Io(e)))).await;
                return;
            }
        };

        pending.extend_from_slice(&chunk[..n]);

        while let Some(pos) = finder.find(&pending) {
            let line_bytes: Vec<u8> = pending.drain(..pos + delimiter.len()).collect();
            let line = String::from_utf8_lossy(&line_bytes[..pos]).into_owned();
            if tx.send(ChannelEvent::Line(line)).await.is_err() {
                // Receiver gone: the supervisor closed this channel.
                return;
            }
        }

        if pending.len() > MAX_PENDING_BYTES {
            warn!(
                port = %path,
                buffered = pending.len(),
                "no delimiter seen, discarding pending bytes"
            );
            pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_nonexistent_port_fails() {
        let factory = SerialChannelFactory::new();
        let result = factory
            .open("/dev/nonexistent_sensor_port_12345", 9600, b"\r\n")
            .await;

        assert!(result.is_err());
    }

    // Framing behavior is covered end-to-end through the mock channel in
    // the supervisor tests; a hardware loopback is not portable, so the
    // delimiter-scan math is checked directly here.
    #[test]
    fn test_delimiter_split_math() {
        let finder = memmem::Finder::new(b"\r\n");
        let mut pending = b"a,1\r\nb,2\r\npartial".to_vec();

        let mut lines = Vec::new();
        while let Some(pos) = finder.find(&pending) {
            let line_bytes: Vec<u8> = pending.drain(..pos + 2).collect();
            lines.push(String::from_utf8_lossy(&line_bytes[..pos]).into_owned());
        }

        assert_eq!(lines, vec!["a,1", "b,2"]);
        assert_eq!(pending, b"partial");
    }
}
