//! Per-task capture buffers for a worker's standard output and log lines.
//!
//! Each task owns exactly one `CaptureChannel`; only that task's worker writes
//! into it. Reads are destructive: the caller gets everything buffered so far
//! and the buffer is left empty.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Default per-buffer limit (1 MiB).
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;

#[derive(Debug)]
struct Buffers {
    stdout: Vec<u8>,
    log: VecDeque<String>,
    log_bytes: usize,
    limit: usize,
}

/// Bounded stdout + log buffers shared between a task and its worker's pumps.
#[derive(Debug, Clone)]
pub struct CaptureChannel {
    inner: Arc<Mutex<Buffers>>,
}

impl CaptureChannel {
    /// Create empty buffers, each holding at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Buffers {
                stdout: Vec::new(),
                log: VecDeque::new(),
                log_bytes: 0,
                limit: limit.max(1),
            })),
        }
    }

    /// Append raw stdout bytes, dropping the oldest bytes past the limit.
    pub async fn write_output(&self, chunk: &[u8]) {
        let mut buf = self.inner.lock().await;
        buf.stdout.extend_from_slice(chunk);
        let mut overflow = buf.stdout.len().saturating_sub(buf.limit);
        if overflow > 0 {
            // Never keep the tail of a split UTF-8 sequence at the front.
            while overflow < buf.stdout.len() && is_continuation(buf.stdout[overflow]) {
                overflow += 1;
            }
            buf.stdout.drain(..overflow);
        }
    }

    /// Append one log line, dropping the oldest lines past the limit.
    pub async fn push_log_line(&self, line: impl Into<String>) {
        let line = line.into();
        let mut buf = self.inner.lock().await;
        buf.log_bytes += line.len() + 1;
        buf.log.push_back(line);
        // Always keep the newest line, even if it alone exceeds the limit.
        while buf.log_bytes > buf.limit && buf.log.len() > 1 {
            if let Some(old) = buf.log.pop_front() {
                buf.log_bytes -= old.len() + 1;
            }
        }
    }

    /// Take everything written to stdout so far.
    pub async fn drain_output(&self) -> String {
        let mut buf = self.inner.lock().await;
        let bytes = std::mem::take(&mut buf.stdout);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Take every buffered log line, newline-terminated.
    pub async fn drain_log(&self) -> String {
        let mut buf = self.inner.lock().await;
        buf.log_bytes = 0;
        let mut out = String::new();
        for line in buf.log.drain(..) {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

impl Default for CaptureChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn output_read_is_destructive() {
        let capture = CaptureChannel::default();
        capture.write_output(b"hello ").await;
        capture.write_output(b"world").await;

        assert_eq!(capture.drain_output().await, "hello world");
        assert_eq!(capture.drain_output().await, "");
    }

    #[tokio::test]
    async fn log_read_is_destructive() {
        let capture = CaptureChannel::default();
        capture.push_log_line("[INFO] testing connection").await;
        capture.push_log_line("[WARNING] target is slow").await;

        assert_eq!(
            capture.drain_log().await,
            "[INFO] testing connection\n[WARNING] target is slow\n"
        );
        assert_eq!(capture.drain_log().await, "");
    }

    #[tokio::test]
    async fn output_keeps_newest_bytes_past_limit() {
        let capture = CaptureChannel::new(8);
        capture.write_output(b"0123456789abcdef").await;
        assert_eq!(capture.drain_output().await, "89abcdef");
    }

    #[tokio::test]
    async fn output_trim_does_not_split_a_character() {
        let capture = CaptureChannel::new(5);
        // "a☃b☃": the cut would land inside the first snowman.
        capture.write_output("a☃b☃".as_bytes()).await;
        assert_eq!(capture.drain_output().await, "b☃");
    }

    #[tokio::test]
    async fn log_drops_oldest_lines_past_limit() {
        let capture = CaptureChannel::new(12);
        capture.push_log_line("first").await;
        capture.push_log_line("second").await;
        capture.push_log_line("third").await;
        assert_eq!(capture.drain_log().await, "third\n");
    }

    #[tokio::test]
    async fn split_utf8_is_reassembled_before_decoding() {
        let capture = CaptureChannel::default();
        let snowman = "☃".as_bytes();
        capture.write_output(&snowman[..1]).await;
        capture.write_output(&snowman[1..]).await;
        assert_eq!(capture.drain_output().await, "☃");
    }

    #[tokio::test]
    async fn clones_share_buffers() {
        let capture = CaptureChannel::default();
        let writer = capture.clone();
        writer.push_log_line("from worker").await;
        assert_eq!(capture.drain_log().await, "from worker\n");
    }
}
