//! Turns a byte stream into decoded text lines.

#[cfg(test)]
mod tests;

use std::io;

use futures::stream::{self, Stream};
use tokio::io::{AsyncBufReadExt as _, AsyncRead, AsyncReadExt as _, BufReader};

/// Longest line accepted, in bytes, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Reads `\n`-terminated UTF-8 lines from an async source.
///
/// A line that is not valid UTF-8 or longer than [`MAX_LINE_LENGTH`] is reported and skipped.
/// End of stream and read errors both end the sequence.
pub struct LineReader<R> {
    label: &'static str,
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_line_length: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(label: &'static str, source: R) -> Self {
        Self {
            label,
            inner: BufReader::new(source),
            buf: Vec::new(),
            max_line_length: MAX_LINE_LENGTH,
        }
    }

    /// Read into `buf` up to and including the next `\n`, stopping one byte past the length
    /// limit. Returns the number of bytes read.
    async fn fill(&mut self) -> io::Result<usize> {
        self.buf.clear();
        let limit = u64::try_from(self.max_line_length).unwrap_or(u64::MAX);
        (&mut self.inner)
            .take(limit.saturating_add(1))
            .read_until(b'\n', &mut self.buf)
            .await
    }

    fn is_oversized(&self) -> bool {
        self.buf.len() > self.max_line_length && self.buf.last() != Some(&b'\n')
    }

    /// Discard the rest of an oversized line. Returns `false` if the stream ended first.
    async fn skip_line(&mut self) -> io::Result<bool> {
        loop {
            match self.fill().await? {
                0 => return Ok(false),
                _ if self.buf.last() == Some(&b'\n') => return Ok(true),
                _ => {}
            }
        }
    }

    async fn read_raw_line(&mut self) -> io::Result<Option<()>> {
        loop {
            if self.fill().await? == 0 {
                return Ok(None);
            }
            if !self.is_oversized() {
                return Ok(Some(()));
            }
            tracing::warn!(
                stream = self.label,
                limit = self.max_line_length,
                "Skipping oversized line"
            );
            if !self.skip_line().await? {
                return Ok(None);
            }
        }
    }

    /// Wait for the next complete line. Returns `None` once the source is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            match self.read_raw_line().await {
                Ok(Some(())) => {}
                Ok(None) => {
                    tracing::debug!(stream = self.label, "Stream closed");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(stream = self.label, ?e, "Failed to read from stream");
                    return None;
                }
            }

            if self.buf.last() == Some(&b'\n') {
                self.buf.pop();
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
            }

            match String::from_utf8(std::mem::take(&mut self.buf)) {
                Ok(line) => return Some(line),
                Err(e) => {
                    tracing::warn!(stream = self.label, %e, "Skipping line with invalid UTF-8");
                    self.buf = e.into_bytes();
                }
            }
        }
    }

    /// Lazy sequence of lines, ending with the source.
    pub fn into_stream(self) -> impl Stream<Item = String> {
        stream::unfold(self, |mut reader| async move {
            let line = reader.next_line().await?;
            Some((line, reader))
        })
    }
}
