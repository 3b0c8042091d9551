// waiter queue part of the bus.
//
// a queue entry is shared between exactly two owners: the suspension future
// parked on it, and the queue itself. whichever side acts first unlinks the
// entry; the other side observes `linked == false` and does nothing. the
// queue is reference-counted independently of whatever owns it, so a
// suspension future that outlives the owning channel still unlinks safely.

use smallvec::SmallVec;
use std::{
    cell::{Cell, RefCell},
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

// waiter queues are almost always short; keep this many entries inline.
const INLINE_WAITERS: usize = 4;

/// FIFO of parked coroutines.
///
/// Cloning yields another handle to the same queue.
pub(crate) struct WaiterQueue {
    waiters: Rc<RefCell<SmallVec<[Rc<Waiter>; INLINE_WAITERS]>>>,
}

// one parked coroutine. exists only for the duration of a single suspension.
struct Waiter {
    // the last-polled-with waker for the parked coroutine.
    waker: RefCell<Option<Waker>>,
    // whether the entry is still in its queue.
    linked: Cell<bool>,
}

impl WaiterQueue {
    pub(crate) fn new() -> Self {
        WaiterQueue {
            waiters: Rc::new(RefCell::new(SmallVec::new())),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.borrow().is_empty()
    }

    /// Future that parks the calling coroutine at the tail of this queue and
    /// resolves once the entry has been detached by a waker.
    ///
    /// The entry is linked on first poll, so creating the future is free and
    /// the link happens in the same cooperative step as the caller's decision
    /// to park. Dropping the future before it resolves unlinks the entry; if
    /// the entry had already absorbed a wakeup, that wakeup is forwarded to
    /// the next waiter so it is not lost.
    pub(crate) fn suspend(&self) -> Suspend {
        Suspend {
            queue: self.clone(),
            waiter: None,
            resolved: false,
        }
    }

    /// Detach the head entry, then wake its coroutine. No-op on an empty
    /// queue.
    ///
    /// Detach strictly precedes the wake: the caller may be about to destroy
    /// the queue's owner, and the woken coroutine must find nothing of itself
    /// left behind here.
    pub(crate) fn wake_one(&self) {
        let head = {
            let mut waiters = self.waiters.borrow_mut();
            if waiters.is_empty() {
                return;
            }
            waiters.remove(0)
        };
        head.linked.set(false);
        let waker = head.waker.borrow_mut().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Detach and wake every entry, head first.
    pub(crate) fn wake_all(&self) {
        loop {
            if self.waiters.borrow().is_empty() {
                break;
            }
            self.wake_one();
        }
    }

    // remove a named entry, wherever it sits. idempotent: the entry may
    // already have been detached by a waker.
    fn unlink(&self, target: &Rc<Waiter>) {
        let mut waiters = self.waiters.borrow_mut();
        if let Some(pos) = waiters.iter().position(|w| Rc::ptr_eq(w, target)) {
            waiters.remove(pos);
        }
        target.linked.set(false);
    }
}

impl Clone for WaiterQueue {
    fn clone(&self) -> Self {
        WaiterQueue {
            waiters: Rc::clone(&self.waiters),
        }
    }
}

/// Future for one suspension on a [`WaiterQueue`]. See
/// [`suspend`](WaiterQueue::suspend).
pub(crate) struct Suspend {
    queue: WaiterQueue,
    waiter: Option<Rc<Waiter>>,
    resolved: bool,
}

impl Future for Suspend {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
        let this = self.get_mut();
        match &this.waiter {
            None => {
                let waiter = Rc::new(Waiter {
                    waker: RefCell::new(Some(cx.waker().clone())),
                    linked: Cell::new(true),
                });
                this.queue.waiters.borrow_mut().push(Rc::clone(&waiter));
                this.waiter = Some(waiter);
                Poll::Pending
            }
            Some(waiter) if waiter.linked.get() => {
                // spurious poll while still parked: remember the new waker.
                *waiter.waker.borrow_mut() = Some(cx.waker().clone());
                Poll::Pending
            }
            Some(_) => {
                this.resolved = true;
                Poll::Ready(())
            }
        }
    }
}

impl Drop for Suspend {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let Some(waiter) = self.waiter.take() else {
            return;
        };
        if waiter.linked.get() {
            self.queue.unlink(&waiter);
        } else {
            // detached by a waker but dropped before resuming: pass the
            // wakeup on so it is not swallowed.
            self.queue.wake_one();
        }
    }
}
