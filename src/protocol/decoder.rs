//! Reply decoder
//!
//! Incremental, resumable decoder for server replies.
//!
//! ## How it works
//! Parsing state lives in a stack of `Task`s, one per nesting level, instead
//! of on the call stack. When the buffered bytes run out, `gets` returns
//! `Ok(None)` and the next call resumes at the deepest unfinished task with
//! every already-decoded array element still in place.
//!
//! ```text
//!  depth 0: Task { Array, len 2, elements: [["hello","world"]] }
//!  depth 1: Task { Bulk, len 1 }        <- waiting for "!\r\n"
//! ```
//!
//! Tasks are reset rather than dropped once they yield, so decoding an array
//! with thousands of elements reuses the same child task for each of them.

use std::mem;

use bytes::Bytes;

use crate::error::{RespError, Result};
use super::buffer::Buffer;
use super::reply::{Reply, ReplyKind};

/// Largest accepted bulk payload (512 MB)
pub const MAX_BULK_LENGTH: i64 = 512 * 1024 * 1024;

/// Largest accepted array element count
pub const MAX_ARRAY_LENGTH: i64 = u32::MAX as i64;

/// Upper bound on elements reserved up front for a new array
const PREALLOC_LIMIT: usize = 1024;

const CRLF: &[u8] = b"\r\n";

/// Outcome of advancing one task
enum Step {
    /// Not enough bytes buffered
    Incomplete,

    /// The task finished and was reset
    Yield(Reply),

    /// The task needs its child to produce the next array element
    Descend,
}

/// Parsing state for one nesting level
#[derive(Debug, Default)]
struct Task {
    /// Reply kind, once the tag byte was read
    kind: Option<ReplyKind>,

    /// Bulk length or array count, once its line was read
    length: Option<i64>,

    /// Array elements decoded so far
    elements: Vec<Reply>,
}

impl Task {
    fn reset(&mut self) {
        self.kind = None;
        self.length = None;
        self.elements.clear();
    }

    fn step(&mut self, buffer: &mut Buffer) -> Result<Step> {
        let kind = match self.kind {
            Some(kind) => kind,
            None => {
                let tag = match buffer.read(1) {
                    Some(tag) => tag[0],
                    None => return Ok(Step::Incomplete),
                };
                let kind = ReplyKind::from_tag(tag).ok_or_else(|| {
                    RespError::Protocol(format!(
                        "got {:?} as reply type byte",
                        char::from(tag)
                    ))
                })?;
                self.kind = Some(kind);
                kind
            }
        };

        match kind {
            ReplyKind::Error | ReplyKind::Status | ReplyKind::Integer => {
                self.step_line(kind, buffer)
            }
            ReplyKind::Bulk => self.step_bulk(buffer),
            ReplyKind::Array => self.step_array(buffer),
        }
    }

    fn step_line(&mut self, kind: ReplyKind, buffer: &mut Buffer) -> Result<Step> {
        let line = match buffer.read_line() {
            Some(line) => line,
            None => return Ok(Step::Incomplete),
        };

        let reply = match kind {
            ReplyKind::Error => Reply::Error(String::from_utf8_lossy(line).into_owned()),
            ReplyKind::Status => Reply::Status(String::from_utf8_lossy(line).into_owned()),
            _ => Reply::Integer(parse_integer(line)?),
        };

        self.reset();
        Ok(Step::Yield(reply))
    }

    fn step_bulk(&mut self, buffer: &mut Buffer) -> Result<Step> {
        let length = match self.read_length(buffer, MAX_BULK_LENGTH)? {
            Some(length) => length,
            None => return Ok(Step::Incomplete),
        };

        if length < 0 {
            self.reset();
            return Ok(Step::Yield(Reply::Bulk(None)));
        }

        let length = length as usize;
        let chunk = match buffer.read(length + CRLF.len()) {
            Some(chunk) => chunk,
            None => return Ok(Step::Incomplete),
        };
        if &chunk[length..] != CRLF {
            return Err(RespError::Protocol(
                "bulk payload not terminated by CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&chunk[..length]);
        self.reset();
        Ok(Step::Yield(Reply::Bulk(Some(data))))
    }

    fn step_array(&mut self, buffer: &mut Buffer) -> Result<Step> {
        let count = match self.read_length(buffer, MAX_ARRAY_LENGTH)? {
            Some(count) => count,
            None => return Ok(Step::Incomplete),
        };

        if count < 0 {
            self.reset();
            return Ok(Step::Yield(Reply::Array(None)));
        }

        if self.elements.len() as i64 == count {
            let items = mem::take(&mut self.elements);
            self.reset();
            return Ok(Step::Yield(Reply::Array(Some(items))));
        }

        Ok(Step::Descend)
    }

    /// Length line of a bulk or array, read once and remembered
    fn read_length(&mut self, buffer: &mut Buffer, max: i64) -> Result<Option<i64>> {
        if let Some(length) = self.length {
            return Ok(Some(length));
        }

        let line = match buffer.read_line() {
            Some(line) => line,
            None => return Ok(None),
        };
        let length = parse_integer(line)?;
        if length > max {
            return Err(RespError::Protocol(format!(
                "length {} exceeds limit {}",
                length, max
            )));
        }

        if length > 0 && self.kind == Some(ReplyKind::Array) {
            self.elements.reserve((length as usize).min(PREALLOC_LIMIT));
        }
        self.length = Some(length);
        Ok(Some(length))
    }
}

/// Parse a signed base-10 line
fn parse_integer(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| {
            RespError::Protocol(format!(
                "invalid integer line \"{}\"",
                line.escape_ascii()
            ))
        })
}

/// Turns a byte stream into replies, one `gets` at a time
#[derive(Debug)]
pub struct Decoder {
    /// Bytes fed but not yet consumed
    buffer: Buffer,

    /// One task per nesting level; index 0 is the root
    tasks: Vec<Task>,

    /// Index of the task currently being advanced
    depth: usize,

    /// Set after a decode fault; the stream can no longer be trusted
    fault: Option<String>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: Buffer::new(),
            tasks: vec![Task::default()],
            depth: 0,
            fault: None,
        }
    }

    /// Append raw bytes. No parsing happens until `gets`.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.append(data);
    }

    /// Try to decode one top-level reply.
    ///
    /// Returns `Ok(None)` when more bytes are needed; feed them and call
    /// again. Returns `RespError::Protocol` on a malformed stream, and keeps
    /// returning it until `reset`.
    pub fn gets(&mut self) -> Result<Option<Reply>> {
        if let Some(reason) = &self.fault {
            return Err(RespError::Protocol(reason.clone()));
        }

        match self.process() {
            Ok(Some(reply)) => {
                self.buffer.discard();
                Ok(Some(reply))
            }
            Ok(None) => Ok(None),
            Err(RespError::Protocol(reason)) => {
                tracing::warn!("Reply stream desynchronized: {}", reason);
                self.fault = Some(reason.clone());
                Err(RespError::Protocol(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn process(&mut self) -> Result<Option<Reply>> {
        loop {
            match self.tasks[self.depth].step(&mut self.buffer)? {
                Step::Incomplete => return Ok(None),
                Step::Descend => {
                    self.depth += 1;
                    if self.tasks.len() == self.depth {
                        self.tasks.push(Task::default());
                    }
                }
                Step::Yield(reply) => {
                    if self.depth == 0 {
                        return Ok(Some(reply));
                    }
                    self.depth -= 1;
                    self.tasks[self.depth].elements.push(reply);
                }
            }
        }
    }

    /// Drop buffered bytes, partial replies and any recorded fault
    pub fn reset(&mut self) {
        self.buffer.clear();
        for task in &mut self.tasks {
            task.reset();
        }
        self.depth = 0;
        self.fault = None;
    }

    /// Number of fed bytes not parsed yet
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Receive buffer, for inspecting compaction
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// True once a decode fault was seen
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }
}
