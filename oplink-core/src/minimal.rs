//! Binary minimal wire: fixed-size records for single-`i32` ops.
//!
//! This is the hot path (read/write-style ops): encoding reuses a scratch
//! buffer owned by the codec, so a dispatched call allocates nothing.

use byteorder::{ByteOrder, LittleEndian};

use crate::codec::{Codec, CodecKind};
use crate::error::{ErrorKind, OpError};
use crate::CallId;

/// Size of the fixed record header: three little-endian 32-bit words.
pub const RECORD_LEN: usize = 12;

/// The three-word call record.
///
/// Requests: `[call_id, arg, 0]` (last word reserved).
/// Responses: `[call_id, arg, result]`; `arg < 0` marks a failure, in which
/// case `result` is the [`ErrorKind`] wire code and any bytes past the header
/// are the UTF-8 failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimalRecord {
    pub call_id: CallId,
    pub arg: i32,
    pub result: i32,
}

impl MinimalRecord {
    pub fn to_bytes(self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        LittleEndian::write_i32(&mut buf[0..4], self.call_id);
        LittleEndian::write_i32(&mut buf[4..8], self.arg);
        LittleEndian::write_i32(&mut buf[8..12], self.result);
        buf
    }

    /// Reinterpret the first 12 bytes; `None` if the buffer is shorter.
    pub fn read_from(bytes: &[u8]) -> Option<MinimalRecord> {
        if bytes.len() < RECORD_LEN {
            return None;
        }
        Some(MinimalRecord {
            call_id: LittleEndian::read_i32(&bytes[0..4]),
            arg: LittleEndian::read_i32(&bytes[4..8]),
            result: LittleEndian::read_i32(&bytes[8..12]),
        })
    }
}

/// Extract the call id from a response header without decoding the rest.
/// The completion router uses this to route the record to its pending call.
pub fn call_id_of(bytes: &[u8]) -> Result<CallId, OpError> {
    match MinimalRecord::read_from(bytes) {
        Some(rec) => Ok(rec.call_id),
        None => Err(OpError::malformed_message()),
    }
}

/// Decode a minimal response.
///
/// Exactly, in order:
/// - `arg < 0`: failure; `result` is the [`ErrorKind`] code, bytes past
///   offset 12 are the UTF-8 failure message,
/// - else if the buffer is exactly 12 bytes: success, value = `result`,
/// - else: protocol violation, `InvalidData("malformed message")`.
pub fn decode(bytes: &[u8]) -> Result<i32, OpError> {
    let Some(rec) = MinimalRecord::read_from(bytes) else {
        return Err(OpError::malformed_message());
    };
    if rec.arg < 0 {
        let message = String::from_utf8_lossy(&bytes[RECORD_LEN..]).into_owned();
        Err(OpError::new(ErrorKind::from_code(rec.result), message))
    } else if bytes.len() == RECORD_LEN {
        Ok(rec.result)
    } else {
        Err(OpError::malformed_message())
    }
}

/// Allocation-free codec for single-`i32` calls.
///
/// The scratch buffer is overwritten on every encode; callers must not
/// retain the returned slice across calls. Safe because dispatch is strictly
/// sequential on one thread.
#[derive(Debug, Default)]
pub struct MinimalCodec {
    scratch: [u8; RECORD_LEN],
}

impl MinimalCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for MinimalCodec {
    type Request = i32;
    type Response = i32;

    fn kind(&self) -> CodecKind {
        CodecKind::Minimal
    }

    fn encode_request(&mut self, call_id: CallId, arg: &i32) -> Result<&[u8], OpError> {
        let rec = MinimalRecord {
            call_id,
            arg: *arg,
            result: 0,
        };
        self.scratch = rec.to_bytes();
        Ok(&self.scratch[..])
    }

    fn decode_response(&mut self, bytes: &[u8]) -> Result<i32, OpError> {
        decode(bytes)
    }
}
