//! Frames the raw backend byte stream into `(format, body)` messages.
//!
//! Grounded on the teacher's `poll_next_message` (every backend message is a
//! 1-byte format tag + 4-byte big-endian length, the length counting itself
//! but not the tag), reimplemented as a `tokio_util::codec::Decoder` instead
//! of a hand-rolled `poll_try_read` loop.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::{err_protocol, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendMessageFormat(pub u8);

pub struct RawMessage {
    pub format: BackendMessageFormat,
    pub contents: Bytes,
}

#[derive(Default)]
pub struct PgCodec;

impl Decoder for PgCodec {
    type Item = RawMessage;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 5 {
            return Ok(None);
        }

        let format = src[0];
        let message_len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;

        let expected_total = message_len
            .checked_add(1)
            .ok_or_else(|| err_protocol!("message_len + 1 overflows usize: {message_len}"))?;

        if src.len() < expected_total {
            src.reserve(expected_total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(expected_total);
        frame.advance(1); // format tag, not counted in message_len
        let mut contents = frame.freeze();
        contents.advance(4); // length prefix

        Ok(Some(RawMessage {
            format: BackendMessageFormat(format),
            contents,
        }))
    }
}

/// Format tags used on the backend->frontend direction, spec.md §6.
pub mod tag {
    pub const AUTHENTICATION: u8 = b'R';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const BIND_COMPLETE: u8 = b'2';
    pub const CLOSE_COMPLETE: u8 = b'3';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const COPY_DATA: u8 = b'd';
    pub const COPY_DONE: u8 = b'c';
    pub const COPY_IN_RESPONSE: u8 = b'G';
    pub const COPY_OUT_RESPONSE: u8 = b'H';
    pub const DATA_ROW: u8 = b'D';
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NO_DATA: u8 = b'n';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    pub const PARAMETER_STATUS: u8 = b'S';
    pub const PARSE_COMPLETE: u8 = b'1';
    pub const PORTAL_SUSPENDED: u8 = b's';
    pub const READY_FOR_QUERY: u8 = b'Z';
    pub const ROW_DESCRIPTION: u8 = b'T';
}
