//! Small byte-level helpers shared by the wire codec.
//!
//! These are deliberately generic (NUL-terminated strings, length-prefixed
//! frames) rather than PostgreSQL-specific; the message layer in `pgconduit`
//! builds the actual frontend/backend message shapes on top of them.

use bytes::{Buf, BufMut};
use std::io;

/// Appends `s` followed by a single NUL byte, as used by every
/// null-terminated string field in the startup/auth/simple-query messages.
pub fn put_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// Reads a NUL-terminated string out of `buf`, advancing past the NUL.
pub fn get_cstr(buf: &mut impl Buf) -> io::Result<String> {
    let mut bytes = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "unterminated C string",
            ));
        }
        let b = buf.get_u8();
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Writes a `u32` length prefix for the bytes that follow, returning the
/// offset of the prefix so the caller can patch it in once the body is known,
/// for messages whose length can't be computed up front.
pub fn reserve_length_prefix(buf: &mut Vec<u8>) -> usize {
    let pos = buf.len();
    buf.put_i32(0);
    pos
}

/// Patches the length prefix written by [`reserve_length_prefix`] with the
/// number of bytes written since, including the prefix itself.
pub fn patch_length_prefix(buf: &mut [u8], pos: usize) {
    let len = (buf.len() - pos) as i32;
    buf[pos..pos + 4].copy_from_slice(&len.to_be_bytes());
}
