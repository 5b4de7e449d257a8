//! # The Shared Slot
//!
//! The state that a [`HandoffChannel`](crate::HandoffChannel) protects with its mutex.
//!
//! A slot holds at most one [`Item`], a flag telling whether it is [`SlotState::Full`],
//! and an end-of-stream marker. It has no synchronization of its own:
//! every transition here assumes the caller holds the channel lock
//! and has already waited for the right precondition.
//!
//! Calling a transition under the wrong precondition is a logic bug in the caller,
//! so it panics instead of returning an error.

/// A published value tagged with its sequence number.
///
/// Sequence numbers start at zero and grow by one for each published value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item<T> {
    seq: u64,
    value: T,
}

impl<T> Item<T> {
    /// Position of this item in the publish order.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (u64, T) {
        (self.seq, self.value)
    }
}

/// Occupancy of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Full,
}

#[derive(Debug)]
pub(crate) struct SharedSlot<T> {
    occupant: Option<Item<T>>,
    state: SlotState,
    /// Set once by the producer; never reset.
    closed: bool,
    next_seq: u64,
    /// Live [`Consumer`](crate::Consumer) handles. Stays zero when the channel is used directly.
    consumers: usize,
}

impl<T> Default for SharedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SharedSlot<T> {
    pub(crate) const fn new() -> Self {
        Self {
            occupant: None,
            state: SlotState::Empty,
            closed: false,
            next_seq: 0,
            consumers: 0,
        }
    }

    pub(crate) fn consumers(&self) -> usize {
        self.consumers
    }

    pub(crate) fn attach_consumer(&mut self) {
        self.consumers += 1;
    }

    /// Returns the number of consumers left.
    pub(crate) fn detach_consumer(&mut self) -> usize {
        assert!(
            self.consumers > 0,
            "protocol violation: detached more consumers than were attached"
        );
        self.consumers -= 1;
        self.consumers
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state
    }

    pub(crate) fn is_full(&self) -> bool {
        self.state == SlotState::Full
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed and drained: nothing will ever be taken from this slot again.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.closed && self.state == SlotState::Empty
    }

    /// Number of values filled so far.
    pub(crate) fn published(&self) -> u64 {
        self.next_seq
    }

    /// Stores a value and returns the sequence number it was given.
    ///
    /// Panics if the slot is full or closed.
    pub(crate) fn fill(&mut self, value: T) -> u64 {
        assert!(
            self.state == SlotState::Empty,
            "protocol violation: fill on a full slot"
        );
        assert!(!self.closed, "protocol violation: fill after close");

        let seq = self.next_seq;
        self.occupant = Some(Item { seq, value });
        self.state = SlotState::Full;
        self.next_seq += 1;
        seq
    }

    /// Removes and returns the pending item.
    ///
    /// Panics if the slot is empty.
    pub(crate) fn drain(&mut self) -> Item<T> {
        assert!(
            self.state == SlotState::Full,
            "protocol violation: drain on an empty slot"
        );
        let Some(item) = self.occupant.take() else {
            unreachable!("a full slot always has an occupant");
        };
        self.state = SlotState::Empty;
        item
    }

    /// Marks the end of the stream.
    ///
    /// Returns `false` if the slot was already closed.
    /// Panics if an item is still pending, since closing would strand it.
    pub(crate) fn close(&mut self) -> bool {
        assert!(
            self.state == SlotState::Empty,
            "protocol violation: close with an item still pending"
        );
        !std::mem::replace(&mut self.closed, true)
    }
}
