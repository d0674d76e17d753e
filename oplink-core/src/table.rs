//! Correlation of in-flight calls to their pending completions.

use std::collections::HashMap;

use futures::channel::oneshot;
use tracing::warn;

use crate::CallId;

/// Raw response bytes delivered to a suspended call.
pub type CompletionBytes = Box<[u8]>;

/// Maps an in-flight call id to the handle that resumes its caller.
///
/// An id present here means exactly one outstanding completion is expected.
/// Entries are created only for calls the host deferred and removed exactly
/// once, at completion. Violations of either rule indicate host/guest
/// desynchronization and are fatal, not retried.
#[derive(Default)]
pub struct CorrelationTable {
    pending: HashMap<CallId, oneshot::Sender<CompletionBytes>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a deferred call. Panics if `id` is already pending:
    /// that is a programming error on the dispatch path.
    pub fn register(&mut self, id: CallId, sender: oneshot::Sender<CompletionBytes>) {
        let prev = self.pending.insert(id, sender);
        assert!(prev.is_none(), "call id {id} registered twice");
    }

    /// Remove the entry for `id` and resume its caller with `bytes`.
    ///
    /// Panics if `id` is unknown: the host referenced a call that was never
    /// registered or already completed, and silently ignoring that would hide
    /// the desync. A second completion for the same id lands here too, since
    /// the first one removed the entry.
    pub fn complete(&mut self, id: CallId, bytes: CompletionBytes) {
        let sender = self
            .pending
            .remove(&id)
            .unwrap_or_else(|| panic!("completion for unknown call id {id} (host/guest desync)"));
        if sender.send(bytes).is_err() {
            // The caller's future was dropped; nothing is waiting anymore.
            warn!(call_id = id, "pending call dropped before its completion");
        }
    }

    pub fn contains(&self, id: CallId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_complete_resolves_exactly_once() {
        let mut table = CorrelationTable::new();
        let (tx, mut rx) = oneshot::channel();
        table.register(5, tx);
        assert!(table.contains(5));

        table.complete(5, Box::from(&b"done"[..]));
        assert!(!table.contains(5));
        assert!(table.is_empty());
        assert_eq!(rx.try_recv().unwrap().unwrap().as_ref(), b"done");
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_is_fatal() {
        let mut table = CorrelationTable::new();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        table.register(1, tx1);
        table.register(1, tx2);
    }

    #[test]
    #[should_panic(expected = "unknown call id")]
    fn completion_for_unknown_id_is_fatal() {
        let mut table = CorrelationTable::new();
        table.complete(42, Box::from(&[][..]));
    }

    #[test]
    #[should_panic(expected = "unknown call id")]
    fn second_completion_for_same_id_is_fatal() {
        let mut table = CorrelationTable::new();
        let (tx, _rx) = oneshot::channel();
        table.register(7, tx);
        table.complete(7, Box::from(&[][..]));
        table.complete(7, Box::from(&[][..]));
    }
}
