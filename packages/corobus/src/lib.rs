//! A cooperative in-process message bus for single-threaded coroutine
//! runtimes
//!
//! A [`Bus`] multiplexes many bounded FIFO channels over one descriptor
//! namespace. Coroutines send and receive 32-bit items across channels,
//! parking when a channel cannot satisfy the operation and resuming when a
//! peer makes progress. A broadcast primitive delivers one item to every open
//! channel atomically once all of them have room; batch primitives move as
//! many items as fit in one step.
//!
//! The runtime seam is the standard `Future`/`Waker` protocol: a coroutine is
//! a `!Send` future driven by a single-threaded cooperative executor, parking
//! is returning `Poll::Pending` with the task's waker filed in a channel's
//! waiter queue, and waking a coroutine merely marks its task runnable. This
//! crate ships no executor of its own; any local executor works, and the
//! sibling `cosched` package provides a deterministic one.
//!
//! Blocking and non-blocking forms come in pairs. `send`/`recv`,
//! `send_v`/`recv_v` and `broadcast` are `async` and park as needed; their
//! `try_` counterparts perform a single pass and fail with
//! [`BusError::WouldBlock`] instead of parking. Blocking forms never surface
//! `WouldBlock` to the caller: they either succeed, or fail with
//! [`BusError::NoChannel`] if their channel disappears (including while they
//! were parked).
//!
//! Guarantees, all per channel or per queue:
//!
//! - Items are received in the order they were sent; broadcast insertions
//!   append like any other send.
//! - Parked coroutines resume in the order they parked.
//! - Every successful transfer wakes at most one parked peer per item moved,
//!   so backlogs drain as a chain of single wakeups rather than a thundering
//!   herd.
//! - A successful broadcast is indivisible: no coroutine ever observes some
//!   channels holding the item and others not.
//!
//! Nothing is guaranteed across distinct channels or distinct waiter queues,
//! and nothing here is safe to share across threads.
//!
//! Closing a channel while coroutines are parked on it is well defined: the
//! descriptor slot is cleared first, then every waiter is woken, and each
//! resumes to find no channel behind its descriptor. Alongside the `Result`
//! every operation returns, it also records its outcome in an errno-style
//! slot readable via [`last_error`], for callers that route results through
//! code without error plumbing.
//!
//! Channels are bounded at a capacity fixed when opened. A capacity of zero
//! is accepted but degenerate: such a channel never accepts an item and
//! never delivers one, and a parked broadcast will wait on it forever. This
//! is _not_ a rendezvous channel.
//!
//! Two cargo features, both on by default, trim the surface: `broadcast`
//! gates the fan-out primitives (and the bus-level waiter queue backing
//! them), `batch` gates the multi-item primitives.

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod api;
mod core;
mod error;
mod waiter_queue;

pub use crate::api::Bus;
pub use crate::core::ChannelId;
pub use crate::error::{last_error, set_last_error, BusError, ErrorKind};
