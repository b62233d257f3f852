//! Protocol Module
//!
//! Wire format shared with Redis-style servers.
//!
//! ## Reply Format
//! ```text
//! -<message>\r\n                  error
//! +<text>\r\n                     status
//! :<i64>\r\n                      integer
//! $<len>\r\n<bytes>\r\n           bulk   ($-1\r\n is null)
//! *<count>\r\n<reply>...          array  (*-1\r\n is null)
//! ```
//!
//! ## Request Format
//! Every command is an array of bulk strings.

mod buffer;
mod command;
mod decoder;
mod reply;

pub use buffer::{Buffer, COMPACTION_THRESHOLD};
pub use command::{encode_command, encode_command_into, Command};
pub use decoder::{Decoder, MAX_ARRAY_LENGTH, MAX_BULK_LENGTH};
pub use reply::{Reply, ReplyKind};
