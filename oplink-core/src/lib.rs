//! oplink-core
//!
//! The call-dispatch layer between an embedded guest runtime and its
//! privileged host: encodes calls onto a shared channel, correlates
//! concurrently outstanding calls, and resolves each one either inline or
//! through a later asynchronous completion.
//!
//! Two wire encodings coexist: a fixed 12-byte record for single-`i32` ops
//! (allocation-free hot path) and a serde-encoded envelope for everything
//! else. One dispatch path, generic over [`Codec`], serves both.
//!
//! Operation *implementations* live behind the [`HostProvider`] seam; this
//! crate only defines how calls into them are encoded, dispatched, completed
//! and how failures cross the boundary.

pub mod bridge;
pub mod codec;
pub mod error;
pub mod minimal;
pub mod structured;
pub mod table;

/// Numeric id of a host-implemented capability.
pub type OpId = u32;

/// Correlation id of an in-flight call. Monotonically increasing from 1;
/// 0 is reserved to mean "resolved inline, no tracking entry".
pub type CallId = i32;

pub use bridge::{Bridge, HostProvider, ZeroCopyBuf};
pub use codec::{Codec, CodecKind};
pub use error::{ErrorKind, OpError};
pub use minimal::{MinimalCodec, MinimalRecord};
pub use structured::StructuredCodec;
