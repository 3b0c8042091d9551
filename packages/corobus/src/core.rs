// bus state: the descriptor slot table and per-channel storage.
//
// everything here is plain data behind the handle's RefCell; the blocking
// discipline lives in api.rs, the park/wake mechanics in waiter_queue.rs.

use crate::waiter_queue::WaiterQueue;
use std::collections::VecDeque;
use std::fmt;

/// Descriptor naming one channel within one bus.
///
/// Descriptors are small dense integers: open always takes the lowest free
/// slot, and the index of a closed channel is reused by a later open. A
/// `ChannelId` held across a close names whatever the slot holds now; the
/// bus re-resolves it on every operation and after every resumption.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChannelId(pub(crate) usize);

impl ChannelId {
    /// The slot index this descriptor names.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// one bounded channel. capacity is fixed at open; a capacity of zero is the
// degenerate configuration in which no send can ever complete.
pub(crate) struct Channel {
    pub(crate) capacity: usize,
    pub(crate) buffer: VecDeque<u32>,
    pub(crate) send_waiters: WaiterQueue,
    pub(crate) recv_waiters: WaiterQueue,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        Channel {
            capacity,
            buffer: VecDeque::new(),
            send_waiters: WaiterQueue::new(),
            recv_waiters: WaiterQueue::new(),
        }
    }

    pub(crate) fn has_room(&self) -> bool {
        self.buffer.len() < self.capacity
    }
}

pub(crate) struct BusCore {
    // slot per descriptor; None marks a closed or never-opened slot.
    slots: Vec<Option<Channel>>,
    #[cfg(feature = "broadcast")]
    pub(crate) broadcast_waiters: WaiterQueue,
}

impl BusCore {
    pub(crate) fn new() -> Self {
        BusCore {
            slots: Vec::new(),
            #[cfg(feature = "broadcast")]
            broadcast_waiters: WaiterQueue::new(),
        }
    }

    /// Place a fresh channel in the lowest free slot, growing the table only
    /// when no hole exists, and return the slot index.
    pub(crate) fn open(&mut self, capacity: usize) -> usize {
        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.slots[index] = Some(Channel::new(capacity));
        trace!(channel = index, capacity, "channel opened");
        index
    }

    /// Close the channel in `index`, silently ignoring a slot that holds no
    /// channel.
    ///
    /// Ordering is load-bearing: the slot is cleared before any waiter is
    /// woken, so a coroutine resuming out of one of this channel's queues
    /// re-resolves its descriptor and finds nothing. Channel storage is
    /// released last, after both queues have been emptied.
    pub(crate) fn close(&mut self, index: usize) {
        let Some(channel) = self.slots.get_mut(index).and_then(Option::take) else {
            return;
        };
        channel.send_waiters.wake_all();
        channel.recv_waiters.wake_all();
        #[cfg(feature = "broadcast")]
        self.broadcast_waiters.wake_all();
        trace!(channel = index, "channel closed");
    }

    /// The only bridge from descriptor to channel. Callers re-invoke it after
    /// every resumption; a resolved reference is never held across a park.
    pub(crate) fn channel_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    #[cfg(feature = "broadcast")]
    pub(crate) fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.slots.iter().flatten()
    }

    #[cfg(feature = "broadcast")]
    pub(crate) fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.slots.iter_mut().flatten()
    }
}

impl Drop for BusCore {
    // destroying the bus with parked coroutines is a caller bug, not a
    // recoverable condition.
    fn drop(&mut self) {
        for channel in self.slots.iter().flatten() {
            assert!(
                channel.send_waiters.is_empty() && channel.recv_waiters.is_empty(),
                "bus destroyed while coroutines are parked on a channel"
            );
        }
        #[cfg(feature = "broadcast")]
        assert!(
            self.broadcast_waiters.is_empty(),
            "bus destroyed while coroutines are parked on broadcast"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fills_slots_densely() {
        let mut core = BusCore::new();
        assert_eq!(core.open(1), 0);
        assert_eq!(core.open(1), 1);
        assert_eq!(core.open(1), 2);
    }

    #[test]
    fn open_reuses_the_lowest_hole() {
        let mut core = BusCore::new();
        for _ in 0..4 {
            core.open(1);
        }
        core.close(1);
        core.close(3);
        assert_eq!(core.open(1), 1);
        assert_eq!(core.open(1), 3);
        // no holes left: the table grows again.
        assert_eq!(core.open(1), 4);
    }

    #[test]
    fn close_of_an_unknown_descriptor_is_silent() {
        let mut core = BusCore::new();
        core.close(0);
        core.close(17);
        let index = core.open(1);
        core.close(index);
        core.close(index);
    }

    #[test]
    fn resolution_fails_for_empty_and_out_of_range_slots() {
        let mut core = BusCore::new();
        assert!(core.channel_mut(0).is_none());
        let index = core.open(2);
        assert!(core.channel_mut(index).is_some());
        core.close(index);
        assert!(core.channel_mut(index).is_none());
        assert!(core.channel_mut(100).is_none());
    }

    #[test]
    fn capacity_is_recorded_per_channel() {
        let mut core = BusCore::new();
        let a = core.open(3);
        let b = core.open(0);
        assert!(core.channel_mut(a).unwrap().has_room());
        // the degenerate zero-capacity channel never has room.
        assert!(!core.channel_mut(b).unwrap().has_room());
    }
}
