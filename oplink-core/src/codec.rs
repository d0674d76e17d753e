use crate::error::OpError;
use crate::CallId;

/// Which wire encoding an operation speaks.
///
/// Recorded per op at registration time so the completion router can extract
/// the call id from a response without knowing the caller's types.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CodecKind {
    /// Fixed 12-byte records, single-`i32` argument/result (hot path).
    Minimal,
    /// serde-encoded payloads of arbitrary shape.
    Structured,
}

/// Encode/decode pair for one operation shape.
///
/// The dispatch core is generic over this trait: the same dispatch path
/// serves both wire encodings, and responses decode identically whether the
/// host answered inline or through a deferred completion.
pub trait Codec {
    type Request;
    type Response;

    fn kind(&self) -> CodecKind;

    /// Encode a request. The returned slice may borrow codec-owned scratch
    /// storage and is only valid until the next encode.
    fn encode_request(&mut self, call_id: CallId, req: &Self::Request)
        -> Result<&[u8], OpError>;

    /// Decode a response into a value or a typed failure.
    fn decode_response(&mut self, bytes: &[u8]) -> Result<Self::Response, OpError>;
}
