// exposed API of the bus.
//
// every blocking operation is the same loop: resolve the descriptor, attempt
// the transfer, otherwise park on the channel's queue and, once woken,
// start over from resolution. nothing learned before a park survives it.

use crate::core::{BusCore, ChannelId};
use crate::error::{fail, set_last_error, BusError, ErrorKind};
use std::cell::RefCell;
use std::rc::Rc;

/// Handle to a message bus: a set of bounded channels sharing one descriptor
/// namespace.
///
/// Cloning yields another handle to the same bus; the bus itself is destroyed
/// when the last handle is dropped. All coroutines sharing a bus must run on
/// the same single-threaded cooperative scheduler; the handle is deliberately
/// not `Send`.
///
/// Destroying the bus while a coroutine is parked inside one of its blocking
/// operations is a caller bug and panics. In practice the ownership rules
/// already prevent it: a parked coroutine's future keeps its `Bus` clone, and
/// with it the bus, alive.
pub struct Bus {
    core: Rc<RefCell<BusCore>>,
}

impl Bus {
    /// Create an empty bus.
    pub fn new() -> Self {
        set_last_error(ErrorKind::None);
        Bus {
            core: Rc::new(RefCell::new(BusCore::new())),
        }
    }

    /// Open a channel holding up to `capacity` items and return its
    /// descriptor.
    ///
    /// The descriptor is the lowest index whose slot is free, so descriptors
    /// stay small and dense and the index of a closed channel is reused.
    ///
    /// `capacity == 0` is accepted as a degenerate configuration: such a
    /// channel never accepts a send and never delivers an item. It is *not* a
    /// rendezvous channel.
    pub fn channel_open(&self, capacity: usize) -> ChannelId {
        let index = self.core.borrow_mut().open(capacity);
        set_last_error(ErrorKind::None);
        ChannelId(index)
    }

    /// Close the channel named by `id`. Closing a descriptor that names no
    /// open channel is silently ignored: close is idempotent.
    ///
    /// Every coroutine parked on the channel is woken; each resumes, fails to
    /// resolve its descriptor, and returns [`BusError::NoChannel`]. Parked
    /// broadcasters are woken too, since the set of open channels shrank.
    pub fn channel_close(&self, id: ChannelId) {
        self.core.borrow_mut().close(id.index());
    }

    /// Send one item, parking the calling coroutine while the channel is
    /// full.
    ///
    /// On success exactly one parked receiver is woken, if any; a cascade of
    /// such single wakeups drains any backlog in FIFO order. Fails only with
    /// [`BusError::NoChannel`], when the descriptor is invalid on entry or
    /// the channel was closed while this coroutine was parked.
    pub async fn send(&self, id: ChannelId, item: u32) -> Result<(), BusError> {
        loop {
            let parked = {
                let mut core = self.core.borrow_mut();
                let Some(channel) = core.channel_mut(id.index()) else {
                    return Err(fail(BusError::NoChannel));
                };
                if channel.has_room() {
                    channel.buffer.push_back(item);
                    channel.recv_waiters.wake_one();
                    set_last_error(ErrorKind::None);
                    return Ok(());
                }
                set_last_error(ErrorKind::WouldBlock);
                channel.send_waiters.suspend()
            };
            parked.await;
        }
    }

    /// Send one item if the channel has room right now; never parks.
    ///
    /// Fails with [`BusError::WouldBlock`] on a full channel, leaving the
    /// buffer untouched.
    pub fn try_send(&self, id: ChannelId, item: u32) -> Result<(), BusError> {
        let mut core = self.core.borrow_mut();
        let Some(channel) = core.channel_mut(id.index()) else {
            return Err(fail(BusError::NoChannel));
        };
        if !channel.has_room() {
            return Err(fail(BusError::WouldBlock));
        }
        channel.buffer.push_back(item);
        channel.recv_waiters.wake_one();
        set_last_error(ErrorKind::None);
        Ok(())
    }

    /// Receive one item, parking the calling coroutine while the channel is
    /// empty.
    ///
    /// On success exactly one parked sender is woken, if any, and one parked
    /// broadcaster (the freed slot may be the one a broadcast is waiting
    /// for). Fails only with [`BusError::NoChannel`].
    pub async fn recv(&self, id: ChannelId) -> Result<u32, BusError> {
        loop {
            let parked = {
                let mut core = self.core.borrow_mut();
                #[cfg(feature = "broadcast")]
                let broadcasters = core.broadcast_waiters.clone();
                let Some(channel) = core.channel_mut(id.index()) else {
                    return Err(fail(BusError::NoChannel));
                };
                if let Some(item) = channel.buffer.pop_front() {
                    channel.send_waiters.wake_one();
                    #[cfg(feature = "broadcast")]
                    broadcasters.wake_one();
                    set_last_error(ErrorKind::None);
                    return Ok(item);
                }
                set_last_error(ErrorKind::WouldBlock);
                channel.recv_waiters.suspend()
            };
            parked.await;
        }
    }

    /// Receive one item if the channel holds one right now; never parks.
    pub fn try_recv(&self, id: ChannelId) -> Result<u32, BusError> {
        let mut core = self.core.borrow_mut();
        #[cfg(feature = "broadcast")]
        let broadcasters = core.broadcast_waiters.clone();
        let Some(channel) = core.channel_mut(id.index()) else {
            return Err(fail(BusError::NoChannel));
        };
        let Some(item) = channel.buffer.pop_front() else {
            return Err(fail(BusError::WouldBlock));
        };
        channel.send_waiters.wake_one();
        #[cfg(feature = "broadcast")]
        broadcasters.wake_one();
        set_last_error(ErrorKind::None);
        Ok(item)
    }

    /// Send as many of `items` as fit, parking until at least one fits.
    ///
    /// Transfers `min(free, items.len())` items in order and returns the
    /// count, waking one parked receiver per item moved. The transfer happens
    /// in a single cooperative step once there is any room: at most one
    /// parking cycle precedes it, and the result is 0 only when `items` is
    /// empty. Callers wanting the whole slice delivered loop on the returned
    /// count.
    #[cfg(feature = "batch")]
    pub async fn send_v(&self, id: ChannelId, items: &[u32]) -> Result<usize, BusError> {
        if items.is_empty() {
            set_last_error(ErrorKind::None);
            return Ok(0);
        }
        loop {
            let parked = {
                let mut core = self.core.borrow_mut();
                let Some(channel) = core.channel_mut(id.index()) else {
                    return Err(fail(BusError::NoChannel));
                };
                if channel.has_room() {
                    let count = (channel.capacity - channel.buffer.len()).min(items.len());
                    channel.buffer.extend(items[..count].iter().copied());
                    for _ in 0..count {
                        channel.recv_waiters.wake_one();
                    }
                    set_last_error(ErrorKind::None);
                    return Ok(count);
                }
                set_last_error(ErrorKind::WouldBlock);
                channel.send_waiters.suspend()
            };
            parked.await;
        }
    }

    /// Non-parking [`send_v`](Self::send_v): fails with
    /// [`BusError::WouldBlock`] when the channel is full.
    #[cfg(feature = "batch")]
    pub fn try_send_v(&self, id: ChannelId, items: &[u32]) -> Result<usize, BusError> {
        if items.is_empty() {
            set_last_error(ErrorKind::None);
            return Ok(0);
        }
        let mut core = self.core.borrow_mut();
        let Some(channel) = core.channel_mut(id.index()) else {
            return Err(fail(BusError::NoChannel));
        };
        if !channel.has_room() {
            return Err(fail(BusError::WouldBlock));
        }
        let count = (channel.capacity - channel.buffer.len()).min(items.len());
        channel.buffer.extend(items[..count].iter().copied());
        for _ in 0..count {
            channel.recv_waiters.wake_one();
        }
        set_last_error(ErrorKind::None);
        Ok(count)
    }

    /// Receive up to `out.len()` items, parking until at least one is
    /// present.
    ///
    /// Pops `min(len, out.len())` items in FIFO order into the front of
    /// `out` and returns the count, waking one parked sender per item moved
    /// plus one parked broadcaster. The result is 0 only when `out` is empty.
    #[cfg(feature = "batch")]
    pub async fn recv_v(&self, id: ChannelId, out: &mut [u32]) -> Result<usize, BusError> {
        if out.is_empty() {
            set_last_error(ErrorKind::None);
            return Ok(0);
        }
        loop {
            let parked = {
                let mut core = self.core.borrow_mut();
                #[cfg(feature = "broadcast")]
                let broadcasters = core.broadcast_waiters.clone();
                let Some(channel) = core.channel_mut(id.index()) else {
                    return Err(fail(BusError::NoChannel));
                };
                if !channel.buffer.is_empty() {
                    let count = channel.buffer.len().min(out.len());
                    for (slot, item) in out.iter_mut().zip(channel.buffer.drain(..count)) {
                        *slot = item;
                    }
                    for _ in 0..count {
                        channel.send_waiters.wake_one();
                    }
                    #[cfg(feature = "broadcast")]
                    broadcasters.wake_one();
                    set_last_error(ErrorKind::None);
                    return Ok(count);
                }
                set_last_error(ErrorKind::WouldBlock);
                channel.recv_waiters.suspend()
            };
            parked.await;
        }
    }

    /// Non-parking [`recv_v`](Self::recv_v): fails with
    /// [`BusError::WouldBlock`] when the channel is empty.
    #[cfg(feature = "batch")]
    pub fn try_recv_v(&self, id: ChannelId, out: &mut [u32]) -> Result<usize, BusError> {
        if out.is_empty() {
            set_last_error(ErrorKind::None);
            return Ok(0);
        }
        let mut core = self.core.borrow_mut();
        #[cfg(feature = "broadcast")]
        let broadcasters = core.broadcast_waiters.clone();
        let Some(channel) = core.channel_mut(id.index()) else {
            return Err(fail(BusError::NoChannel));
        };
        if channel.buffer.is_empty() {
            return Err(fail(BusError::WouldBlock));
        }
        let count = channel.buffer.len().min(out.len());
        for (slot, item) in out.iter_mut().zip(channel.buffer.drain(..count)) {
            *slot = item;
        }
        for _ in 0..count {
            channel.send_waiters.wake_one();
        }
        #[cfg(feature = "broadcast")]
        broadcasters.wake_one();
        set_last_error(ErrorKind::None);
        Ok(count)
    }

    /// Deliver `item` to every open channel at once, parking until all of
    /// them have room simultaneously.
    ///
    /// The delivery is atomic: once every open channel has room, the item is
    /// appended to all of them within one cooperative step, so no other
    /// coroutine ever observes a partial fan-out. One parked receiver is
    /// woken per channel. A parked broadcast re-evaluates the whole condition
    /// whenever any channel drains an item or the channel set changes.
    ///
    /// Fails with [`BusError::NoChannel`] when the bus has no open channels.
    /// Note that a zero-capacity channel never has room, so its existence
    /// parks every broadcast until it is closed.
    #[cfg(feature = "broadcast")]
    pub async fn broadcast(&self, item: u32) -> Result<(), BusError> {
        loop {
            let parked = {
                let mut core = self.core.borrow_mut();
                if core.channels().next().is_none() {
                    return Err(fail(BusError::NoChannel));
                }
                if core.channels().all(|channel| channel.has_room()) {
                    let mut fanout = 0usize;
                    for channel in core.channels_mut() {
                        channel.buffer.push_back(item);
                        channel.recv_waiters.wake_one();
                        fanout += 1;
                    }
                    trace!(fanout, item, "broadcast delivered");
                    set_last_error(ErrorKind::None);
                    return Ok(());
                }
                set_last_error(ErrorKind::WouldBlock);
                core.broadcast_waiters.suspend()
            };
            parked.await;
        }
    }

    /// Non-parking [`broadcast`](Self::broadcast): fails with
    /// [`BusError::WouldBlock`] if any open channel is full, delivering
    /// nothing.
    #[cfg(feature = "broadcast")]
    pub fn try_broadcast(&self, item: u32) -> Result<(), BusError> {
        let mut core = self.core.borrow_mut();
        if core.channels().next().is_none() {
            return Err(fail(BusError::NoChannel));
        }
        if !core.channels().all(|channel| channel.has_room()) {
            return Err(fail(BusError::WouldBlock));
        }
        let mut fanout = 0usize;
        for channel in core.channels_mut() {
            channel.buffer.push_back(item);
            channel.recv_waiters.wake_one();
            fanout += 1;
        }
        trace!(fanout, item, "broadcast delivered");
        set_last_error(ErrorKind::None);
        Ok(())
    }
}

impl Clone for Bus {
    fn clone(&self) -> Self {
        Bus {
            core: Rc::clone(&self.core),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Bus::new()
    }
}
