//! Command framing
//!
//! Requests go out as an array of bulk strings:
//!
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg>\r\n      (once per argument)
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Encode an argument list as one request, appending to `out`
pub fn encode_command_into<A: AsRef<[u8]>>(args: &[A], out: &mut BytesMut) {
    let payload: usize = args.iter().map(|arg| arg.as_ref().len() + 16).sum();
    out.reserve(16 + payload);

    put_header(out, b'*', args.len());
    for arg in args {
        let arg = arg.as_ref();
        put_header(out, b'$', arg.len());
        out.put_slice(arg);
        out.put_slice(b"\r\n");
    }
}

/// Encode an argument list as one request
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Bytes {
    let mut out = BytesMut::new();
    encode_command_into(args, &mut out);
    out.freeze()
}

fn put_header(out: &mut BytesMut, tag: u8, len: usize) {
    out.put_u8(tag);
    out.put_slice(len.to_string().as_bytes());
    out.put_slice(b"\r\n");
}

/// A request under construction.
///
/// Arguments are stored in their wire form: `arg` coerces anything
/// printable to its text representation first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    /// Start a command with its name
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            args: vec![name.as_ref().to_vec()],
        }
    }

    /// Append an argument in its text representation
    pub fn arg<T: fmt::Display>(mut self, arg: T) -> Self {
        self.args.push(arg.to_string().into_bytes());
        self
    }

    /// Append a binary argument as is
    pub fn arg_bytes(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    pub fn encode(&self) -> Bytes {
        encode_command(&self.args)
    }

    pub fn encode_into(&self, out: &mut BytesMut) {
        encode_command_into(&self.args, out);
    }
}

impl<A: AsRef<[u8]>> FromIterator<A> for Command {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Self {
            args: iter.into_iter().map(|arg| arg.as_ref().to_vec()).collect(),
        }
    }
}
