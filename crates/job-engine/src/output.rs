//! In-memory byte sink used for a job's stdout and stderr.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Cloneable handle over a shared output buffer.
///
/// Clones write into the same buffer, so a handler may hand a clone to a
/// helper while the engine keeps the original for the outcome.
#[derive(Clone, Default)]
pub struct Output {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Output {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `line` plus a trailing newline.
    pub fn write_line(&self, line: &str) {
        let mut buf = self.buf.lock();
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }

    pub fn write_bytes(&self, data: &[u8]) {
        self.buf.lock().extend_from_slice(data);
    }

    /// Snapshot of everything written so far.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }

    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Last non-blank line, trimmed.
    #[must_use]
    pub fn last_line(&self) -> Option<String> {
        last_line(&self.buf.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buf.lock())
    }
}

impl Write for Output {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_bytes(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output").field("len", &self.len()).finish()
    }
}

pub(crate) fn last_line(data: &[u8]) -> Option<String> {
    String::from_utf8_lossy(data)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_buffer() {
        let out = Output::new();
        let mut clone = out.clone();
        write!(clone, "hello ").unwrap();
        out.write_line("world");

        assert_eq!(out.to_string_lossy(), "hello world\n");
    }

    #[test]
    fn test_last_line_skips_blank_tail() {
        let out = Output::new();
        out.write_line("first");
        out.write_line("  second  ");
        out.write_bytes(b"\n\n");

        assert_eq!(out.last_line().as_deref(), Some("second"));
        assert_eq!(Output::new().last_line(), None);
    }

    #[test]
    fn test_take_drains() {
        let out = Output::new();
        out.write_bytes(b"abc");
        assert_eq!(out.take(), b"abc");
        assert!(out.is_empty());
    }
}
