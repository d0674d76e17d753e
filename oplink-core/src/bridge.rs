//! Dispatch core: the call channel between guest code and its host.
//!
//! A [`Bridge`] owns all per-runtime-instance state (op registry, correlation
//! tables, call-id counter), so several isolated guest runtimes can coexist
//! in one process. Cloning a bridge clones a handle to the same instance.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use bytes::BytesMut;
use futures::channel::oneshot;
use tracing::{debug, trace};

use crate::codec::{Codec, CodecKind};
use crate::error::{ErrorKind, OpError};
use crate::table::{CompletionBytes, CorrelationTable};
use crate::{minimal, structured, CallId, OpId};

/// A byte buffer shared across the host boundary without copying.
///
/// Read-style ops hand one of these to the host, which fills it in place;
/// ownership stays with the caller for the call's duration. Cloning shares
/// the same storage. Single-thread only.
#[derive(Clone, Debug, Default)]
pub struct ZeroCopyBuf(Rc<RefCell<BytesMut>>);

impl ZeroCopyBuf {
    /// A zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self(Rc::new(RefCell::new(BytesMut::zeroed(len))))
    }

    pub fn borrow(&self) -> Ref<'_, BytesMut> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, BytesMut> {
        self.0.borrow_mut()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.borrow().to_vec()
    }
}

impl From<Vec<u8>> for ZeroCopyBuf {
    fn from(v: Vec<u8>) -> Self {
        Self(Rc::new(RefCell::new(BytesMut::from(&v[..]))))
    }
}

/// The privileged side of the channel.
///
/// `invoke` receives the op id, the encoded control record, and the optional
/// raw buffer. Returning `Some(bytes)` completes the call inline; returning
/// `None` defers it, and the host must later deliver exactly one completion
/// for it through [`Bridge::complete`].
///
/// `invoke` runs while the bridge is borrowed and must not call back into it;
/// deferred completions are delivered from the host's event loop.
pub trait HostProvider {
    fn invoke(
        &mut self,
        op: OpId,
        control: &[u8],
        zero_copy: Option<ZeroCopyBuf>,
    ) -> Option<Box<[u8]>>;
}

struct BridgeState<H> {
    host: H,
    /// op id -> wire encoding, fixed at registration.
    ops: HashMap<OpId, CodecKind>,
    minimal_pending: CorrelationTable,
    structured_pending: CorrelationTable,
    next_call_id: CallId,
}

impl<H> BridgeState<H> {
    fn expect_op(&self, op: OpId, kind: CodecKind) {
        match self.ops.get(&op) {
            Some(k) if *k == kind => {}
            Some(k) => panic!("op {op} is registered as {k:?} but was dispatched as {kind:?}"),
            None => panic!("dispatch of unregistered op {op}"),
        }
    }

    fn table_mut(&mut self, kind: CodecKind) -> &mut CorrelationTable {
        match kind {
            CodecKind::Minimal => &mut self.minimal_pending,
            CodecKind::Structured => &mut self.structured_pending,
        }
    }

    /// Next call id, monotonically increasing from 1; 0 is reserved for
    /// inline-resolution dispatch. On wrap-around, ids still pending in
    /// either table are skipped so an in-flight call is never aliased.
    fn alloc_call_id(&mut self) -> CallId {
        let mut scanned: u64 = 0;
        loop {
            let id = self.next_call_id;
            self.next_call_id = if id == i32::MAX { 1 } else { id + 1 };
            if !self.minimal_pending.contains(id) && !self.structured_pending.contains(id) {
                return id;
            }
            scanned += 1;
            assert!(
                scanned <= i32::MAX as u64,
                "call id space exhausted: every id is pending"
            );
        }
    }
}

/// Per-runtime-instance dispatch core.
pub struct Bridge<H> {
    state: Rc<RefCell<BridgeState<H>>>,
}

impl<H> Clone for Bridge<H> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

enum Dispatched {
    Inline(Box<[u8]>),
    Deferred(oneshot::Receiver<CompletionBytes>),
}

impl<H: HostProvider> Bridge<H> {
    pub fn new(host: H) -> Self {
        Self {
            state: Rc::new(RefCell::new(BridgeState {
                host,
                ops: HashMap::new(),
                minimal_pending: CorrelationTable::new(),
                structured_pending: CorrelationTable::new(),
                next_call_id: 1,
            })),
        }
    }

    /// Register an op and the wire encoding it speaks. Dispatching or
    /// completing an op that was never registered is fatal, as is
    /// registering the same op twice.
    pub fn register_op(&self, op: OpId, kind: CodecKind) {
        let prev = self.state.borrow_mut().ops.insert(op, kind);
        assert!(prev.is_none(), "op {op} registered twice");
        debug!(op, ?kind, "op registered");
    }

    /// Dispatch a call that must complete inline. The call id on the wire is
    /// 0, so no correlation entry is ever created; a deferred response here
    /// is a protocol violation.
    pub fn call_sync<C: Codec>(
        &self,
        codec: &mut C,
        op: OpId,
        req: &C::Request,
        zero_copy: Option<ZeroCopyBuf>,
    ) -> Result<C::Response, OpError> {
        let response = {
            let mut st = self.state.borrow_mut();
            st.expect_op(op, codec.kind());
            let control = codec.encode_request(0, req)?;
            trace!(op, "sync dispatch");
            st.host.invoke(op, control, zero_copy)
        };
        let bytes = response
            .unwrap_or_else(|| panic!("op {op}: host deferred a response to a sync dispatch"));
        codec.decode_response(&bytes)
    }

    /// Dispatch a call the host may answer now or later.
    ///
    /// If the host responds inline the result is decoded immediately and no
    /// correlation entry remains. Otherwise the call is registered under its
    /// id and the caller suspends until [`Bridge::complete`] delivers the
    /// response. Both paths decode identically.
    pub async fn call<C: Codec>(
        &self,
        codec: &mut C,
        op: OpId,
        req: &C::Request,
        zero_copy: Option<ZeroCopyBuf>,
    ) -> Result<C::Response, OpError> {
        let dispatched = {
            let mut st = self.state.borrow_mut();
            st.expect_op(op, codec.kind());
            let call_id = st.alloc_call_id();
            let control = codec.encode_request(call_id, req)?;
            match st.host.invoke(op, control, zero_copy) {
                Some(bytes) => {
                    trace!(op, call_id, "dispatched, completed inline");
                    Dispatched::Inline(bytes)
                }
                None => {
                    let (tx, rx) = oneshot::channel();
                    st.table_mut(codec.kind()).register(call_id, tx);
                    trace!(op, call_id, "dispatched, deferred");
                    Dispatched::Deferred(rx)
                }
            }
        };

        let bytes = match dispatched {
            Dispatched::Inline(bytes) => bytes,
            Dispatched::Deferred(rx) => rx.await.map_err(|_: oneshot::Canceled| {
                OpError::new(ErrorKind::Interrupted, "call channel closed")
            })?,
        };
        codec.decode_response(&bytes)
    }

    /// Completion router: the single entry point the host uses to deliver an
    /// asynchronous completion. Extracts the call id from the response
    /// header (per the op's registered encoding), removes the pending entry
    /// and resumes the suspended caller. Never blocks; exactly one
    /// completion per registered id.
    pub fn complete(&self, op: OpId, response: &[u8]) {
        let mut st = self.state.borrow_mut();
        let kind = *st
            .ops
            .get(&op)
            .unwrap_or_else(|| panic!("completion for unregistered op {op}"));
        let call_id = match kind {
            CodecKind::Minimal => minimal::call_id_of(response),
            CodecKind::Structured => structured::call_id_of(response),
        }
        .unwrap_or_else(|e| panic!("unroutable completion for op {op}: {e}"));
        trace!(op, call_id, "async completion");
        st.table_mut(kind).complete(call_id, response.into());
    }

    /// Number of calls currently awaiting a completion.
    pub fn pending_calls(&self) -> usize {
        let st = self.state.borrow();
        st.minimal_pending.len() + st.structured_pending.len()
    }

    /// Test seam: point the id counter at an arbitrary position so the
    /// wrap-around path is reachable without 2^31 dispatches.
    #[cfg(test)]
    fn set_next_call_id(&self, id: CallId) {
        self.state.borrow_mut().next_call_id = id;
    }
}
