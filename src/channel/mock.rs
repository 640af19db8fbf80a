//! Mock channel implementation for testing.
//!
//! Provides a [`MockChannelFactory`] that simulates line channels without
//! hardware. Each open hands back a [`MockChannelControl`] through which a
//! test can feed lines, drop the link, inspect writes, and count opens.

use super::error::ChannelError;
use super::{ChannelEvent, ChannelFactory, ChannelWriter, OpenChannel, LINE_QUEUE_CAPACITY};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct FactoryState {
    /// Number of open calls observed (including failed ones).
    open_count: usize,
    /// Errors to return for upcoming opens, in order.
    fail_queue: VecDeque<ChannelError>,
    /// When true, every open fails with a generic open error.
    fail_all: bool,
    /// When true, the next open never completes (for timeout tests).
    hang_next: bool,
    /// Controls for every successfully opened channel, oldest first.
    opened: Vec<MockChannelControl>,
}

/// Scripted [`ChannelFactory`] for tests.
///
/// # Example
/// ```
/// use sensor_bridge::channel::{ChannelFactory, MockChannelFactory};
///
/// # async fn example() {
/// let factory = MockChannelFactory::new();
/// let channel = factory.open("MOCK0", 9600, b"\n").await.unwrap();
/// let control = factory.last_opened().unwrap();
/// control.push_line("23.5,60").await;
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockChannelFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next open attempt.
    pub fn fail_next_open(&self, error: ChannelError) {
        self.state.lock().fail_queue.push_back(error);
    }

    /// Make every subsequent open fail.
    pub fn fail_all_opens(&self, fail: bool) {
        self.state.lock().fail_all = fail;
    }

    /// Make the next open hang forever, so the caller's deadline fires.
    pub fn hang_next_open(&self) {
        self.state.lock().hang_next = true;
    }

    /// Number of open calls observed so far.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Control handle for the most recently opened channel.
    pub fn last_opened(&self) -> Option<MockChannelControl> {
        self.state.lock().opened.last().cloned()
    }

    /// Control handles for every channel opened so far, oldest first.
    pub fn all_opened(&self) -> Vec<MockChannelControl> {
        self.state.lock().opened.clone()
    }
}

#[async_trait]
impl ChannelFactory for MockChannelFactory {
    async fn open(
        &self,
        path: &str,
        _baud_rate: u32,
        _delimiter: &[u8],
    ) -> Result<OpenChannel, ChannelError> {
        let hang = {
            let mut state = self.state.lock();
            state.open_count += 1;
            if state.hang_next {
                state.hang_next = false;
                true
            } else {
                false
            }
        };
        if hang {
            return std::future::pending().await;
        }

        let (control, rx) = {
            let mut state = self.state.lock();
            if let Some(err) = state.fail_queue.pop_front() {
                return Err(err);
            }
            if state.fail_all {
                return Err(ChannelError::open(format!("scripted failure for {path}")));
            }

            let (tx, rx) = mpsc::channel(LINE_QUEUE_CAPACITY);
            let control = MockChannelControl {
                path: path.to_string(),
                line_tx: tx,
                writes: Arc::new(Mutex::new(Vec::new())),
                write_error: Arc::new(Mutex::new(false)),
            };
            state.opened.push(control.clone());
            (control, rx)
        };

        Ok(OpenChannel {
            path: path.to_string(),
            lines: rx,
            writer: Box::new(MockWriter {
                writes: Arc::clone(&control.writes),
                write_error: Arc::clone(&control.write_error),
            }),
            reader_task: None,
        })
    }
}

/// Test-side handle to one opened mock channel.
#[derive(Clone)]
pub struct MockChannelControl {
    path: String,
    line_tx: mpsc::Sender<ChannelEvent>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    write_error: Arc<Mutex<bool>>,
}

impl MockChannelControl {
    /// Path this channel was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Feed one framed line to the channel's consumer.
    pub async fn push_line(&self, line: &str) {
        let _ = self
            .line_tx
            .send(ChannelEvent::Line(line.to_string()))
            .await;
    }

    /// Simulate the link dropping. `None` models a clean end of stream.
    pub async fn drop_link(&self, error: Option<ChannelError>) {
        let _ = self.line_tx.send(ChannelEvent::Closed(error)).await;
    }

    /// Whether the consumer has dropped its receive half (channel closed).
    pub fn is_closed(&self) -> bool {
        self.line_tx.is_closed()
    }

    /// Everything written to this channel, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        *self.write_error.lock() = fail;
    }
}

struct MockWriter {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    write_error: Arc<Mutex<bool>>,
}

#[async_trait]
impl ChannelWriter for MockWriter {
    async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        if *self.write_error.lock() {
            return Err(ChannelError::Io(std::io::Error::other("scripted write failure")));
        }
        self.writes.lock().push(data.to_vec());
        Ok(data.len())
    }

    async fn shutdown(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_and_push_line() {
        let factory = MockChannelFactory::new();
        let mut channel = factory.open("MOCK0", 9600, b"\n").await.unwrap();
        let control = factory.last_opened().unwrap();

        control.push_line("hello").await;
        match channel.lines.recv().await {
            Some(ChannelEvent::Line(line)) => assert_eq!(line, "hello"),
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_log() {
        let factory = MockChannelFactory::new();
        let mut channel = factory.open("MOCK0", 9600, b"\n").await.unwrap();
        let control = factory.last_opened().unwrap();

        channel.writer.write(b"PING").await.unwrap();
        assert_eq!(control.written(), vec![b"PING".to_vec()]);
    }

    #[tokio::test]
    async fn test_scripted_open_failure() {
        let factory = MockChannelFactory::new();
        factory.fail_next_open(ChannelError::not_found("MOCK0"));

        let result = factory.open("MOCK0", 9600, b"\n").await;
        assert!(matches!(result, Err(ChannelError::NotFound(_))));
        assert_eq!(factory.open_count(), 1);

        // Next open succeeds again
        assert!(factory.open("MOCK0", 9600, b"\n").await.is_ok());
    }

    #[tokio::test]
    async fn test_close_detection() {
        let factory = MockChannelFactory::new();
        let channel = factory.open("MOCK0", 9600, b"\n").await.unwrap();
        let control = factory.last_opened().unwrap();

        assert!(!control.is_closed());
        channel.close().await;
        assert!(control.is_closed());
    }
}
