//! Reply definitions
//!
//! Represents decoded server replies.

use std::fmt;

use bytes::Bytes;

use crate::error::{RespError, Result};

/// Type tag that opens every reply on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyKind {
    Error = b'-',
    Status = b'+',
    Integer = b':',
    Bulk = b'$',
    Array = b'*',
}

impl ReplyKind {
    /// Map a tag byte to its reply kind
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'-' => Some(ReplyKind::Error),
            b'+' => Some(ReplyKind::Status),
            b':' => Some(ReplyKind::Integer),
            b'$' => Some(ReplyKind::Bulk),
            b'*' => Some(ReplyKind::Array),
            _ => None,
        }
    }
}

/// A fully decoded reply.
///
/// `Bulk(None)` and `Array(None)` are the protocol's null values and are
/// distinct from an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `-` reply; carries the message without the tag.
    /// Invalid UTF-8 is replaced with U+FFFD.
    Error(String),

    /// `+` reply, with invalid UTF-8 replaced like `Error`
    Status(String),

    /// `:` reply
    Integer(i64),

    /// `$` reply
    Bulk(Option<Bytes>),

    /// `*` reply
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Build a bulk reply from anything byte-like
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        Reply::Bulk(Some(Bytes::copy_from_slice(data.as_ref())))
    }

    /// Kind of this reply
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Error(_) => ReplyKind::Error,
            Reply::Status(_) => ReplyKind::Status,
            Reply::Integer(_) => ReplyKind::Integer,
            Reply::Bulk(_) => ReplyKind::Bulk,
            Reply::Array(_) => ReplyKind::Array,
        }
    }

    /// True for null bulk and null array
    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Payload of a bulk reply
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(Some(data)) => Some(&data[..]),
            _ => None,
        }
    }

    /// Text of a status, error or UTF-8 bulk reply
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(text) | Reply::Error(text) => Some(text.as_str()),
            Reply::Bulk(Some(data)) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Elements of a non-null array reply
    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(Some(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Turn a top-level error reply into `Err`, leaving nested errors alone
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Error(message) => Err(RespError::ErrorReply(message)),
            other => Ok(other),
        }
    }

    /// First error reply found depth-first, including `self`
    pub fn first_error(&self) -> Option<&str> {
        match self {
            Reply::Error(message) => Some(message.as_str()),
            Reply::Array(Some(items)) => items.iter().find_map(Reply::first_error),
            _ => None,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        match self {
            Reply::Error(message) => write!(f, "(error) {}", message),
            Reply::Status(text) => write!(f, "{}", text),
            Reply::Integer(value) => write!(f, "(integer) {}", value),
            Reply::Bulk(None) | Reply::Array(None) => write!(f, "(nil)"),
            Reply::Bulk(Some(data)) => write!(f, "\"{}\"", data.escape_ascii()),
            Reply::Array(Some(items)) if items.is_empty() => write!(f, "(empty array)"),
            Reply::Array(Some(items)) => {
                let width = items.len().to_string().len();
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        writeln!(f)?;
                        write!(f, "{:indent$}", "", indent = indent)?;
                    }
                    write!(f, "{:>width$}) ", idx + 1, width = width)?;
                    item.fmt_indented(f, indent + width + 2)?;
                }
                Ok(())
            }
        }
    }
}

/// Renders replies the way redis-cli prints them
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
