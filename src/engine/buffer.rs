//! Bounded capture buffers for child process output.
//!
//! Writes past the capacity are discarded.  The reader keeps pulling from the
//! pipe regardless, so a chatty child never blocks on a full OS pipe.

/// Stdout ceiling: 1 MiB.
pub const STDOUT_CAP_BYTES: usize = 1024 * 1024;
/// Stderr ceiling: 64 KiB.
pub const STDERR_CAP_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// BoundedBuffer
// ---------------------------------------------------------------------------

/// Fixed-capacity byte sink that keeps the first `cap` bytes.
#[derive(Debug, Clone)]
pub struct BoundedBuffer {
    bytes: Vec<u8>,
    cap: usize,
    dropped: usize,
}

impl BoundedBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            bytes: Vec::new(),
            cap,
            dropped: 0,
        }
    }

    /// Append as much of `chunk` as fits; count the rest as dropped.
    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.cap.saturating_sub(self.bytes.len());
        let take = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..take]);
        self.dropped += chunk.len() - take;
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped > 0
    }

    /// Bytes discarded because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Decode as UTF-8, replacing invalid sequences.
    ///
    /// The result never exceeds the capacity in bytes.  A partial multi-byte
    /// character cut by the cap is removed, and replacement characters that
    /// would grow the text past the cap are cut at a character boundary.
    pub fn into_string(self) -> String {
        let cap = self.cap;
        let truncated = self.is_truncated();
        let mut text = match String::from_utf8(self.bytes) {
            Ok(text) => return text,
            Err(err) => {
                let mut bytes = err.into_bytes();
                if truncated {
                    if let Err(utf8) = std::str::from_utf8(&bytes) {
                        if utf8.error_len().is_none() {
                            bytes.truncate(utf8.valid_up_to());
                        }
                    }
                }
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };
        if text.len() > cap {
            let mut end = cap;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        text
    }
}

// ---------------------------------------------------------------------------
// CapturedOutput
// ---------------------------------------------------------------------------

/// Both streams of one finished process.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: BoundedBuffer,
    pub stderr: BoundedBuffer,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_prefix_and_counts_overflow() {
        let mut buf = BoundedBuffer::new(8);
        buf.push(b"hello ");
        buf.push(b"world");

        assert_eq!(buf.len(), 8);
        assert_eq!(buf.dropped(), 3);
        assert!(buf.is_truncated());
        assert_eq!(buf.into_string(), "hello wo");
    }

    #[test]
    fn full_buffer_ignores_further_writes() {
        let mut buf = BoundedBuffer::new(4);
        buf.push(b"abcd");
        for _ in 0..1000 {
            buf.push(&[b'z'; 1024]);
        }
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.dropped(), 1000 * 1024);
    }

    #[test]
    fn partial_multibyte_tail_is_removed() {
        // "ก" is three bytes; a cap of 4 splits the second one.
        let mut buf = BoundedBuffer::new(4);
        buf.push("กก".as_bytes());

        let text = buf.into_string();
        assert_eq!(text, "ก");
        assert!(text.len() <= 4);
    }

    #[test]
    fn invalid_bytes_inside_are_replaced() {
        let mut buf = BoundedBuffer::new(16);
        buf.push(b"ok\xffok");
        assert_eq!(buf.into_string(), "ok\u{fffd}ok");
    }

    #[test]
    fn replacement_characters_stay_within_cap() {
        // Each invalid byte decodes to a three-byte U+FFFD.
        let mut buf = BoundedBuffer::new(1000);
        buf.push(&[0xff; 5000]);

        let text = buf.into_string();
        assert!(text.len() <= 1000, "{} bytes", text.len());
        assert_eq!(text.chars().count(), 333);
        assert!(text.chars().all(|c| c == '\u{fffd}'));
    }
}
