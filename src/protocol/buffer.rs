//! Receive buffer
//!
//! Append-only byte accumulator with a read cursor. Consumed bytes stay in
//! place until the cursor passes `COMPACTION_THRESHOLD`, so compaction costs
//! an amortized constant per byte no matter how small the replies are.
//!
//! ```text
//! ┌──────────────────┬───────────────────────────┐
//! │ consumed [0,pos) │ unconsumed [pos, len)     │
//! └──────────────────┴───────────────────────────┘
//! ```

use bytes::{Buf, BytesMut};

/// Cursor position past which `discard` physically drops the consumed prefix
pub const COMPACTION_THRESHOLD: usize = 1024;

const CRLF: &[u8] = b"\r\n";

/// Cursor-tracked byte buffer owned by a single decoder
#[derive(Debug, Default)]
pub struct Buffer {
    /// Backing store, including the consumed prefix
    data: BytesMut,

    /// Read cursor
    pos: usize,

    /// Offset where the next CRLF search resumes
    scanned: usize,
}

impl Buffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes at the end of the buffer
    pub fn append(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// Number of bytes not yet consumed
    pub fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of consumed bytes still held in the backing store
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Bytes physically held: consumed prefix plus unconsumed tail
    pub fn physical_len(&self) -> usize {
        self.data.len()
    }

    /// Read exactly `n` bytes and advance the cursor.
    ///
    /// Returns `None` without moving the cursor when fewer than `n` bytes
    /// are buffered.
    pub fn read(&mut self, n: usize) -> Option<&[u8]> {
        let end = self.pos.checked_add(n)?;
        if end > self.data.len() {
            return None;
        }

        let start = self.pos;
        self.pos = end;
        self.scanned = self.scanned.max(end);
        Some(&self.data[start..end])
    }

    /// Read up to the next CRLF and advance past it.
    ///
    /// The terminator is not part of the returned slice. Returns `None`
    /// when no CRLF is buffered yet; bytes already searched are not searched
    /// again on the next call.
    pub fn read_line(&mut self) -> Option<&[u8]> {
        let from = self.scanned.max(self.pos);

        match find_crlf(&self.data[from..]) {
            Some(offset) => {
                let start = self.pos;
                let stop = from + offset;
                self.pos = stop + CRLF.len();
                self.scanned = self.pos;
                Some(&self.data[start..stop])
            }
            None => {
                // A trailing '\r' may be the first half of a split CRLF
                self.scanned = self.data.len().saturating_sub(1).max(self.pos);
                None
            }
        }
    }

    /// Drop the consumed prefix once the cursor passed the threshold
    pub fn discard(&mut self) {
        if self.pos >= COMPACTION_THRESHOLD {
            self.data.advance(self.pos);
            self.scanned -= self.pos;
            self.pos = 0;
        }
    }

    /// Forget everything, consumed or not
    pub fn clear(&mut self) {
        self.data.clear();
        self.pos = 0;
        self.scanned = 0;
    }
}

fn find_crlf(haystack: &[u8]) -> Option<usize> {
    haystack.windows(CRLF.len()).position(|window| window == CRLF)
}
