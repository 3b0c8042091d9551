//! A deterministic single-threaded cooperative scheduler
//!
//! This crate is the runtime half of a cooperative system: it drives `!Send`
//! futures ("coroutines") on one thread, in a strictly deterministic order. A
//! coroutine runs until it suspends (returns `Poll::Pending`) or completes;
//! nothing preempts it in between. Waking a coroutine appends its task id to a
//! FIFO run queue, so for any fixed spawn order and wake order, execution
//! order is fully reproducible. That determinism is the point: code built on
//! precise park/wake disciplines can be tested against exact interleavings
//! instead of races.
//!
//! The scheduler makes no attempt at timers, I/O, or work stealing. A task's
//! identity is its [`Waker`]; external code holding a clone of that waker can
//! make the task runnable, and nothing else can.
//!
//! ```
//! use cosched::{Scheduler, yield_now};
//!
//! let sched = Scheduler::new();
//! sched.spawn(async {
//!     yield_now().await;
//! });
//! sched.run();
//! assert_eq!(sched.alive(), 0);
//! ```

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Wake, Waker},
};

/// Single-threaded executor with a FIFO run queue.
///
/// Tasks are polled in the exact order their ids were pushed onto the run
/// queue, whether by [`spawn`](Self::spawn) or by a waker. [`run`](Self::run)
/// drains the queue; tasks that are alive but parked are left alone until
/// something wakes them.
pub struct Scheduler {
    // slot per spawned task; None once the task has completed.
    tasks: RefCell<Vec<Option<Pin<Box<dyn Future<Output = ()>>>>>>,
    ready: Arc<ReadyQueue>,
    // tasks spawned and not yet completed (runnable or parked).
    live: Cell<usize>,
}

// the run queue is the only piece wakers touch. it is behind a mutex purely
// because `std::task::Wake` requires Send + Sync; the lock is never contended
// on a single thread.
struct ReadyQueue(Mutex<VecDeque<usize>>);

struct TaskWaker {
    id: usize,
    ready: Arc<ReadyQueue>,
}

impl ReadyQueue {
    fn push(&self, id: usize) {
        self.0.lock().unwrap().push_back(id);
    }

    fn pop(&self) -> Option<usize> {
        self.0.lock().unwrap().pop_front()
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.ready.push(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.push(self.id);
    }
}

impl Scheduler {
    /// Construct a scheduler with no tasks.
    pub fn new() -> Self {
        Scheduler {
            tasks: RefCell::new(Vec::new()),
            ready: Arc::new(ReadyQueue(Mutex::new(VecDeque::new()))),
            live: Cell::new(0),
        }
    }

    /// Spawn a coroutine. It is appended to the run queue immediately, behind
    /// every task that is already runnable.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let mut tasks = self.tasks.borrow_mut();
        let id = tasks.len();
        tasks.push(Some(Box::pin(fut)));
        self.live.set(self.live.get() + 1);
        self.ready.push(id);
    }

    /// Poll runnable tasks in FIFO order until none are runnable.
    ///
    /// Returns once the run queue is empty. Tasks that parked themselves stay
    /// alive; call [`alive`](Self::alive) to see how many remain. A non-zero
    /// count after `run` means every remaining task is waiting on a wakeup
    /// that has not happened yet.
    pub fn run(&self) {
        while let Some(id) = self.ready.pop() {
            // take the future out of its slot so the task is free to spawn
            // siblings (which re-borrows the table) while being polled. a
            // stale queue entry for a completed task leaves None behind.
            let Some(mut fut) = self.tasks.borrow_mut().get_mut(id).and_then(Option::take) else {
                continue;
            };
            let waker = Waker::from(Arc::new(TaskWaker {
                id,
                ready: Arc::clone(&self.ready),
            }));
            let mut cx = Context::from_waker(&waker);
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(()) => self.live.set(self.live.get() - 1),
                Poll::Pending => self.tasks.borrow_mut()[id] = Some(fut),
            }
        }
    }

    /// Number of tasks that have been spawned and have not completed,
    /// runnable or parked.
    pub fn alive(&self) -> usize {
        self.live.get()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

/// Suspend the current coroutine and immediately mark it runnable again,
/// letting every other runnable task go first.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future for [`yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
        let this = self.get_mut();
        if this.yielded {
            Poll::Ready(())
        } else {
            this.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn runs_tasks_in_spawn_order() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            sched.spawn(async move {
                log.borrow_mut().push(i);
            });
        }
        sched.run();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(sched.alive(), 0);
    }

    #[test]
    fn yield_moves_task_to_back_of_queue() {
        let sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            sched.spawn(async move {
                log.borrow_mut().push("a1");
                yield_now().await;
                log.borrow_mut().push("a2");
            });
        }
        {
            let log = Rc::clone(&log);
            sched.spawn(async move {
                log.borrow_mut().push("b1");
            });
        }
        sched.run();
        assert_eq!(*log.borrow(), vec!["a1", "b1", "a2"]);
    }

    #[test]
    fn parked_task_stays_alive_until_woken() {
        let sched = Scheduler::new();
        let waker_slot: Rc<RefCell<Option<Waker>>> = Rc::new(RefCell::new(None));

        struct Park {
            slot: Rc<RefCell<Option<Waker>>>,
        }
        impl Future for Park {
            type Output = ();
            fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
                let mut slot = self.slot.borrow_mut();
                if slot.is_some() {
                    Poll::Ready(())
                } else {
                    *slot = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        }

        sched.spawn(Park {
            slot: Rc::clone(&waker_slot),
        });
        sched.run();
        assert_eq!(sched.alive(), 1);

        let waker = waker_slot.borrow().clone().unwrap();
        waker.wake();
        sched.run();
        assert_eq!(sched.alive(), 0);
    }

    #[test]
    fn duplicate_wakes_are_harmless() {
        let sched = Scheduler::new();
        let polls = Rc::new(Cell::new(0));

        struct TwoPolls {
            polls: Rc<Cell<u32>>,
        }
        impl Future for TwoPolls {
            type Output = ();
            fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
                self.polls.set(self.polls.get() + 1);
                if self.polls.get() >= 2 {
                    Poll::Ready(())
                } else {
                    // wake twice; the second queue entry must not poll a
                    // completed task.
                    cx.waker().wake_by_ref();
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }

        sched.spawn(TwoPolls {
            polls: Rc::clone(&polls),
        });
        sched.run();
        assert_eq!(polls.get(), 2);
        assert_eq!(sched.alive(), 0);
    }

    #[test]
    fn tasks_spawned_while_running_are_executed() {
        let sched = Rc::new(Scheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            let inner = Rc::clone(&sched);
            sched.spawn(async move {
                log.borrow_mut().push(1);
                let log2 = Rc::clone(&log);
                inner.spawn(async move {
                    log2.borrow_mut().push(2);
                });
            });
        }
        sched.run();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }
}
