//! Single-thread cooperative executor.
//!
//! The guest runs on one logical thread: tasks make progress until they
//! suspend on a pending host call, then the outer event loop hands control
//! back to the host. Drive it with [`LocalExecutor::run_until_stalled`]
//! between host events.
//!
//! Unlike a work-stealing executor, spawned futures do not need to be `Send`;
//! guest state is `Rc`-shared and never leaves this thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::task::{waker_ref, ArcWake};
use futures::FutureExt;

use parking_lot::Mutex;
use slab::Slab;
use tracing::trace;

/// Tickless single-thread executor core.
///
/// Typical usage:
/// - create `LocalExecutor` on the thread that owns the guest runtime,
/// - `spawn` guest tasks,
/// - in the event loop: `run_until_stalled()`, deliver pending host
///   completions, repeat.
pub struct LocalExecutor {
    tasks: RefCell<Slab<TaskSlot>>,
    ready: Arc<ReadyQueue>,
}

struct TaskSlot {
    /// Taken out while the task is being polled.
    future: Option<LocalBoxFuture<'static, ()>>,
    /// Created once at spawn; polling borrows it via `waker_ref`, so a poll
    /// allocates nothing.
    waker: Arc<TaskWaker>,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            tasks: RefCell::new(Slab::new()),
            ready: Arc::new(ReadyQueue::default()),
        }
    }

    /// Spawn a task. The future runs on this thread only and may hold
    /// non-`Send` state (`Rc`, `RefCell`, ...).
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let (tx, rx) = oneshot::channel::<T>();
        let task_fut = async move {
            let out = fut.await;
            let _ = tx.send(out);
        };

        let id = {
            let mut tasks = self.tasks.borrow_mut();
            let entry = tasks.vacant_entry();
            let id = entry.key();
            entry.insert(TaskSlot {
                future: Some(task_fut.boxed_local()),
                waker: Arc::new(TaskWaker {
                    id,
                    ready: self.ready.clone(),
                }),
            });
            id
        };
        self.ready.push(id);

        JoinHandle { rx }
    }

    /// Poll ready tasks until no further progress can be made.
    /// Returns the number of polls performed (not tasks completed).
    pub fn run_until_stalled(&self) -> usize {
        let mut polled = 0usize;
        while let Some(id) = self.ready.pop() {
            // A stale wake for a finished (or reused) slot is harmless:
            // an empty slot is skipped, a fresh task just gets an extra poll.
            let Some((mut fut, task_waker)) = self.take_task(id) else {
                continue;
            };
            polled += 1;

            let waker = waker_ref(&task_waker);
            let mut cx = Context::from_waker(&waker);

            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {
                    trace!(task = id, "task finished");
                    self.tasks.borrow_mut().remove(id);
                }
                Poll::Pending => {
                    // Put the future back; the waker re-enqueues it later.
                    if let Some(slot) = self.tasks.borrow_mut().get_mut(id) {
                        slot.future = Some(fut);
                    }
                }
            }
        }
        polled
    }

    /// Number of tasks that have not finished yet.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Take the future out of its slot for polling, along with the slot's
    /// cached waker. The tasks borrow must not be held across the poll, so a
    /// task may itself spawn.
    fn take_task(&self, id: usize) -> Option<(LocalBoxFuture<'static, ()>, Arc<TaskWaker>)> {
        let mut tasks = self.tasks.borrow_mut();
        let slot = tasks.get_mut(id)?;
        let fut = slot.future.take()?;
        Some((fut, slot.waker.clone()))
    }
}

/// Handle to a spawned task's result.
pub struct JoinHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> JoinHandle<T> {
    /// Take the result if the task has already finished.
    pub fn try_take(&mut self) -> Option<T> {
        self.rx.try_recv().ok().flatten()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, oneshot::Canceled>;
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx)
    }
}

/// Cooperative yield: reschedule the current task once.
pub async fn yield_now() {
    struct YieldNow(bool);
    impl Future for YieldNow {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
    YieldNow(false).await
}

/// Wake-side state. Wakers must be `Send + Sync` by contract even though the
/// executor itself never leaves its thread, hence the `Arc`/`Mutex` here.
#[derive(Default)]
struct ReadyQueue {
    queue: Mutex<VecDeque<usize>>,
}

impl ReadyQueue {
    fn push(&self, id: usize) {
        self.queue.lock().push_back(id);
    }

    fn pop(&self) -> Option<usize> {
        self.queue.lock().pop_front()
    }
}

struct TaskWaker {
    id: usize,
    ready: Arc<ReadyQueue>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.ready.push(arc_self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn spawn_and_complete() {
        let ex = LocalExecutor::new();
        let mut handle = ex.spawn(async { 1 + 2 });
        assert_eq!(handle.try_take(), None);
        ex.run_until_stalled();
        assert_eq!(handle.try_take(), Some(3));
        assert_eq!(ex.pending_tasks(), 0);
    }

    #[test]
    fn yield_now_reschedules_once() {
        let ex = LocalExecutor::new();
        let steps = Rc::new(Cell::new(0));
        let steps2 = steps.clone();
        let mut handle = ex.spawn(async move {
            steps2.set(1);
            yield_now().await;
            steps2.set(2);
        });
        ex.run_until_stalled();
        assert_eq!(steps.get(), 2);
        assert!(handle.try_take().is_some());
    }

    #[test]
    fn task_suspended_on_channel_wakes_on_send() {
        let ex = LocalExecutor::new();
        let (tx, rx) = oneshot::channel::<u32>();
        let mut handle = ex.spawn(async move { rx.await.unwrap() });

        ex.run_until_stalled();
        assert_eq!(handle.try_take(), None, "task must stay suspended");

        tx.send(7).unwrap();
        ex.run_until_stalled();
        assert_eq!(handle.try_take(), Some(7));
    }

    #[test]
    fn waker_survives_repeated_suspensions_of_one_task() {
        let ex = LocalExecutor::new();
        let (tx1, rx1) = oneshot::channel::<u32>();
        let (tx2, rx2) = oneshot::channel::<u32>();
        let mut handle = ex.spawn(async move { rx1.await.unwrap() + rx2.await.unwrap() });

        // every suspension hands out a clone of the slot's one waker
        ex.run_until_stalled();
        tx1.send(1).unwrap();
        ex.run_until_stalled();
        assert!(handle.try_take().is_none());

        tx2.send(2).unwrap();
        ex.run_until_stalled();
        assert_eq!(handle.try_take(), Some(3));
    }

    #[test]
    fn independent_tasks_resolve_in_completion_order() {
        let ex = LocalExecutor::new();
        let (tx_a, rx_a) = oneshot::channel::<&'static str>();
        let (tx_b, rx_b) = oneshot::channel::<&'static str>();
        let mut a = ex.spawn(async move { rx_a.await.unwrap() });
        let mut b = ex.spawn(async move { rx_b.await.unwrap() });
        ex.run_until_stalled();

        // Complete b first; a stays pending.
        tx_b.send("b").unwrap();
        ex.run_until_stalled();
        assert_eq!(b.try_take(), Some("b"));
        assert_eq!(a.try_take(), None);

        tx_a.send("a").unwrap();
        ex.run_until_stalled();
        assert_eq!(a.try_take(), Some("a"));
    }
}
