//! Structured wire: serde-encoded payloads of arbitrary shape.
//!
//! A request is the user payload with the call id merged in beside it as
//! `promiseId`. A response is either `{promiseId?, ok}` or
//! `{promiseId?, err: {kind, message}}`. The optional raw byte segment does
//! not travel on this wire at all; it is handed to the host by reference
//! (see [`crate::bridge::ZeroCopyBuf`]).

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, CodecKind};
use crate::error::{ErrorKind, OpError};
use crate::CallId;

/// The failure half of a structured response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Serialize)]
struct RequestEnvelope<'a, T> {
    #[serde(rename = "promiseId")]
    promise_id: CallId,
    #[serde(flatten)]
    args: &'a T,
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "promiseId", default)]
    _promise_id: Option<CallId>,
    #[serde(default)]
    ok: Option<serde_json::Value>,
    #[serde(default)]
    err: Option<WireError>,
}

/// Extract the call id from a response without decoding the payload.
/// The completion router uses this to route the record to its pending call.
pub fn call_id_of(bytes: &[u8]) -> Result<CallId, OpError> {
    #[derive(Deserialize)]
    struct Header {
        #[serde(rename = "promiseId")]
        promise_id: CallId,
    }
    serde_json::from_slice::<Header>(bytes)
        .map(|h| h.promise_id)
        .map_err(|_| OpError::malformed_message())
}

/// Decode a structured response: `err` wins over `ok`; a missing `ok` decodes
/// as `null` (unit results).
pub fn decode<R: DeserializeOwned>(bytes: &[u8]) -> Result<R, OpError> {
    let resp: ResponseEnvelope =
        serde_json::from_slice(bytes).map_err(|_| OpError::malformed_message())?;
    if let Some(err) = resp.err {
        return Err(OpError::new(err.kind, err.message));
    }
    let ok = resp.ok.unwrap_or(serde_json::Value::Null);
    serde_json::from_value(ok)
        .map_err(|e| OpError::new(ErrorKind::InvalidData, format!("bad structured result: {e}")))
}

/// Codec for ops with structured arguments/results.
///
/// `Req` must serialize to a map (its fields sit next to `promiseId` in one
/// object). The encode buffer is reused across calls.
pub struct StructuredCodec<Req, Res> {
    buf: Vec<u8>,
    _marker: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res> Default for StructuredCodec<Req, Res> {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<Req, Res> StructuredCodec<Req, Res> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<Req, Res> Codec for StructuredCodec<Req, Res>
where
    Req: Serialize,
    Res: DeserializeOwned,
{
    type Request = Req;
    type Response = Res;

    fn kind(&self) -> CodecKind {
        CodecKind::Structured
    }

    fn encode_request(&mut self, call_id: CallId, req: &Req) -> Result<&[u8], OpError> {
        self.buf.clear();
        let envelope = RequestEnvelope {
            promise_id: call_id,
            args: req,
        };
        serde_json::to_writer(&mut self.buf, &envelope).map_err(|e| {
            OpError::new(ErrorKind::InvalidData, format!("unencodable arguments: {e}"))
        })?;
        Ok(self.buf.as_slice())
    }

    fn decode_response(&mut self, bytes: &[u8]) -> Result<Res, OpError> {
        decode(bytes)
    }
}
