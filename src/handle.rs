//! # Safety Through Types
//!
//! [`HandoffChannel`] trusts its callers to have a single producer that stops publishing
//! once it has closed the channel. The handles returned by [`channel()`] make that a
//! compile-time property instead:
//!
//! - [`Producer`] can't be cloned, and [`Producer::close`] takes ownership of it,
//!   so nothing can be published after the close.
//! - Dropping a [`Producer`] closes the channel, so the consumers are released even when
//!   the producing thread returns early or panics.
//! - [`Consumer`] is cheap to clone, one per worker thread.
//!
//! The cost is an [`Arc`] shared between all handles.

use crate::channel::HandoffChannel;
use crate::config::HandoffConfig;
use crate::error::{PublishTimeoutError, TimedOut};
use crate::slot::Item;
use std::sync::Arc;
use std::time::Duration;

/// Creates a channel with the default configuration and returns its producer and consumer ends.
pub fn channel<T>() -> (Producer<T>, Consumer<T>) {
    channel_with_config(HandoffConfig::default())
}

pub fn channel_with_config<T>(config: HandoffConfig) -> (Producer<T>, Consumer<T>) {
    let channel = Arc::new(HandoffChannel::with_config(config));
    channel.attach_consumer();
    let producer = Producer {
        channel: Arc::clone(&channel),
    };
    let consumer = Consumer { channel };

    (producer, consumer)
}

#[derive(Debug)]
pub struct Producer<T> {
    channel: Arc<HandoffChannel<T>>,
}

impl<T> Producer<T> {
    /// Blocking publish
    ///
    /// See [`HandoffChannel::publish()`].
    pub fn publish(&self, value: T) {
        self.channel.publish(value);
    }

    pub fn publish_timeout(
        &self,
        value: T,
        timeout: Duration,
    ) -> Result<(), PublishTimeoutError<T>> {
        self.channel.publish_timeout(value, timeout)
    }

    /// Closes the channel once the last item was taken.
    ///
    /// Same as dropping the producer. If every [`Consumer`] is gone while an item is still
    /// pending, that item is dropped instead of waiting forever for it to be taken.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.channel.close_or_abandon();
    }
}

#[derive(Debug)]
pub struct Consumer<T> {
    channel: Arc<HandoffChannel<T>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        self.channel.attach_consumer();
        Self {
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.channel.detach_consumer();
    }
}

impl<T> Consumer<T> {
    /// Blocking take
    ///
    /// See [`HandoffChannel::take()`].
    pub fn take(&self) -> Option<Item<T>> {
        self.channel.take()
    }

    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<Item<T>>, TimedOut> {
        self.channel.take_timeout(timeout)
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Iterates over the items this consumer takes, until the end of the stream.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { consumer: self }
    }
}

// `Consumer` must not implement `Iterator`: `Iterator::take` would shadow `Consumer::take`.

pub struct Iter<'a, T> {
    consumer: &'a Consumer<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = Item<T>;

    fn next(&mut self) -> Option<Item<T>> {
        self.consumer.take()
    }
}

pub struct IntoIter<T> {
    consumer: Consumer<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = Item<T>;

    fn next(&mut self) -> Option<Item<T>> {
        self.consumer.take()
    }
}

impl<T> IntoIterator for Consumer<T> {
    type Item = Item<T>;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { consumer: self }
    }
}

impl<'a, T> IntoIterator for &'a Consumer<T> {
    type Item = Item<T>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
