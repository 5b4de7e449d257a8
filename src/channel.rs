//! # The Handoff Channel
//!
//! A single-slot channel between one producer and any number of consumers,
//! built from a [`Mutex`] and two [`Condvar`]s.
//!
//! - `became_full` is notified by the producer after it filled the slot. Consumers wait on it.
//! - `became_empty` is notified by a consumer after it drained the slot. The producer waits on it.
//!
//! Every read and write of the slot happens under the mutex,
//! including the predicate check a thread does before deciding to wait.
//! Waiting threads re-check their predicate after every wake-up, since a condition variable
//! may wake spuriously, or wake a consumer that then loses the item to another consumer.
//!
//! Only one item is in flight at a time, so consumers receive items in publish order.
//! Which consumer gets a particular item is not specified.
//!
//! ## Termination
//!
//! When the source is exhausted, the producer calls [`HandoffChannel::close()`].
//! There is no further item whose notification could wake the consumers still blocked in
//! [`HandoffChannel::take()`], so `close()` itself has to reach all of them.
//! By default it notifies all of them ([`WakeStrategy::Broadcast`]).
//! With [`WakeStrategy::Relay`] it notifies just one, and every consumer that observes the end
//! of the stream notifies one more before returning.

use crate::config::{HandoffConfig, WakeStrategy};
use crate::error::{PublishTimeoutError, TimedOut};
use crate::slot::{Item, SharedSlot, SlotState};
use std::process;
use std::sync::{Condvar, LockResult, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

#[derive(Debug)]
pub struct HandoffChannel<T> {
    slot: Mutex<SharedSlot<T>>,
    became_full: Condvar,
    became_empty: Condvar,
    config: HandoffConfig,
}

impl<T> Default for HandoffChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffChannel<T> {
    pub fn new() -> Self {
        Self::with_config(HandoffConfig::default())
    }

    pub fn with_config(config: HandoffConfig) -> Self {
        Self {
            slot: Mutex::new(SharedSlot::new()),
            became_full: Condvar::new(),
            became_empty: Condvar::new(),
            config,
        }
    }

    pub fn config(&self) -> &HandoffConfig {
        &self.config
    }

    /// Blocking publish
    ///
    /// Waits until the slot is empty, then stores `value` in it and wakes one consumer.
    ///
    /// Must only be called by the single producer.
    /// Panics if the channel has already been closed.
    pub fn publish(&self, value: T) {
        let mut slot = self.lock();
        while slot.is_full() {
            // `wait()` atomically unlocks the mutex and blocks; it re-locks before returning.
            slot = or_abort(self.became_empty.wait(slot));
        }
        self.fill(slot, value);
    }

    /// Like [`HandoffChannel::publish()`], but gives up after `timeout`.
    ///
    /// On timeout the value is handed back inside the error.
    pub fn publish_timeout(
        &self,
        value: T,
        timeout: Duration,
    ) -> Result<(), PublishTimeoutError<T>> {
        let slot = self.lock();
        let (slot, _) = or_abort(self.became_empty.wait_timeout_while(slot, timeout, |slot| {
            slot.is_full()
        }));
        if slot.is_full() {
            trace!(?timeout, "publish timed out");
            return Err(PublishTimeoutError(value));
        }
        self.fill(slot, value);
        Ok(())
    }

    /// Marks the end of the stream and wakes the waiting consumers.
    ///
    /// Waits for the last published item to be taken first.
    /// Calling it again after the channel is closed does nothing.
    pub fn close(&self) {
        let mut slot = self.lock();
        while slot.is_full() {
            slot = or_abort(self.became_empty.wait(slot));
        }
        self.close_drained(slot);
    }

    /// Closes the channel on behalf of a [`Producer`](crate::Producer) that is going away.
    ///
    /// Like [`HandoffChannel::close()`], but stops waiting for the pending item once no
    /// [`Consumer`](crate::Consumer) handle is left to take it. That item is then dropped.
    pub(crate) fn close_or_abandon(&self) {
        let mut slot = self.lock();
        while slot.is_full() && slot.consumers() > 0 {
            slot = or_abort(self.became_empty.wait(slot));
        }
        if slot.is_full() {
            let item = slot.drain();
            warn!(seq = item.seq(), "no consumer left; dropping the pending item");
        }
        self.close_drained(slot);
    }

    pub(crate) fn attach_consumer(&self) {
        self.lock().attach_consumer();
    }

    pub(crate) fn detach_consumer(&self) {
        let mut slot = self.lock();
        if slot.detach_consumer() == 0 {
            // A producer closing from `Drop` may be waiting for an item nobody can take now.
            self.became_empty.notify_all();
        }
    }

    fn close_drained(&self, mut slot: MutexGuard<'_, SharedSlot<T>>) {
        if !slot.close() {
            debug!("channel already closed");
            return;
        }
        debug!(
            published = slot.published(),
            strategy = %self.config.wake_on_close,
            "channel closed"
        );

        match self.config.wake_on_close {
            WakeStrategy::Broadcast => self.became_full.notify_all(),
            WakeStrategy::Relay => self.became_full.notify_one(),
        }
    }

    /// Blocking take
    ///
    /// Waits until an item is available and returns it, or returns `None` once the channel is
    /// closed and drained. From then on every call returns `None` without blocking.
    ///
    /// Any number of consumers may call this concurrently. Each item goes to exactly one of them.
    pub fn take(&self) -> Option<Item<T>> {
        let mut slot = self.lock();
        while !slot.is_full() && !slot.is_closed() {
            slot = or_abort(self.became_full.wait(slot));
        }
        self.drain_or_finish(slot)
    }

    /// Like [`HandoffChannel::take()`], but gives up after `timeout`.
    ///
    /// `Ok(None)` still means the end of the stream;
    /// `Err(TimedOut)` means the channel is open and no item arrived in time.
    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<Item<T>>, TimedOut> {
        let slot = self.lock();
        let (slot, _) = or_abort(self.became_full.wait_timeout_while(slot, timeout, |slot| {
            !slot.is_full() && !slot.is_closed()
        }));
        if !slot.is_full() && !slot.is_closed() {
            trace!(?timeout, "take timed out");
            return Err(TimedOut);
        }
        Ok(self.drain_or_finish(slot))
    }

    /// Current occupancy of the slot.
    pub fn state(&self) -> SlotState {
        self.lock().state()
    }

    /// Whether [`HandoffChannel::close()`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    /// Number of items published so far.
    pub fn published(&self) -> u64 {
        self.lock().published()
    }

    fn fill(&self, mut slot: MutexGuard<'_, SharedSlot<T>>, value: T) {
        let seq = slot.fill(value);
        trace!(seq, "published");
        // Only one consumer can take the item, so there's no point in waking more.
        self.became_full.notify_one();
    }

    fn drain_or_finish(&self, mut slot: MutexGuard<'_, SharedSlot<T>>) -> Option<Item<T>> {
        if slot.is_exhausted() {
            if self.config.wake_on_close == WakeStrategy::Relay {
                // Pass the wake-up on to the next blocked consumer, if any.
                self.became_full.notify_one();
            }
            trace!("end of stream observed");
            return None;
        }

        let item = slot.drain();
        trace!(seq = item.seq(), "taken");
        self.became_empty.notify_one();
        Some(item)
    }

    fn lock(&self) -> MutexGuard<'_, SharedSlot<T>> {
        or_abort(self.slot.lock())
    }
}

/// A poisoned lock means some thread panicked in the middle of a slot transition.
/// The slot can't be trusted any more, and letting other threads carry on with it could
/// lose or duplicate items, so the whole process goes down.
fn or_abort<G>(result: LockResult<G>) -> G {
    match result {
        Ok(guard) => guard,
        Err(_) => {
            error!("handoff channel lock poisoned; aborting");
            process::abort()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering::{Acquire, Release};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Instant;

    /// Runs one producer publishing `0..items` and `consumers` consumers,
    /// and returns the sequence numbers each consumer received.
    fn fan_out(strategy: WakeStrategy, consumers: usize, items: u64) -> Vec<Vec<u64>> {
        let config = HandoffConfig::default().with_wake_on_close(strategy);
        let channel = HandoffChannel::with_config(config);
        let channel = &channel;

        thread::scope(|s| {
            let handles: Vec<_> = (0..consumers)
                .map(|_| {
                    s.spawn(move || {
                        let mut seen = Vec::new();
                        while let Some(item) = channel.take() {
                            assert_eq!(item.seq(), *item.value());
                            seen.push(item.seq());
                        }
                        seen
                    })
                })
                .collect();

            for i in 0..items {
                channel.publish(i);
            }
            channel.close();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    fn check_fan_out(per_consumer: Vec<Vec<u64>>, items: u64) {
        for seen in &per_consumer {
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order: {seen:?}");
        }
        let mut all: Vec<u64> = per_consumer.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!((0..items).collect::<Vec<_>>(), all);
    }

    #[test]
    fn test_three_items_three_consumers() {
        let channel = &HandoffChannel::new();
        let started = &Barrier::new(4);

        let taken: Vec<Vec<&str>> = thread::scope(|s| {
            let handles: Vec<_> = (0..3)
                .map(|_| {
                    s.spawn(move || {
                        started.wait();
                        let mut taken = Vec::new();
                        while let Some(item) = channel.take() {
                            taken.push(item.into_value());
                        }
                        // Closed and drained: stays that way.
                        assert!(channel.take().is_none());
                        taken
                    })
                })
                .collect();

            started.wait();
            for line in ["a", "b", "c"] {
                channel.publish(line);
            }
            channel.close();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let all: Vec<&str> = taken.into_iter().flatten().collect();
        assert_eq!(3, all.len());
        let all: HashSet<&str> = all.into_iter().collect();
        assert_eq!(HashSet::from(["a", "b", "c"]), all);
    }

    #[test]
    fn test_fan_out_broadcast() {
        check_fan_out(fan_out(WakeStrategy::Broadcast, 8, 1000), 1000);
    }

    #[test]
    fn test_fan_out_relay() {
        check_fan_out(fan_out(WakeStrategy::Relay, 8, 1000), 1000);
    }

    #[test]
    fn test_drain_order_is_publish_order() {
        for strategy in [WakeStrategy::Broadcast, WakeStrategy::Relay] {
            let config = HandoffConfig::default().with_wake_on_close(strategy);
            let channel = &HandoffChannel::with_config(config);
            // Each take and its log entry happen under this lock, so the log is the drain order.
            let log = &Mutex::new(Vec::new());

            thread::scope(|s| {
                for _ in 0..6 {
                    s.spawn(move || loop {
                        let mut log = log.lock().unwrap();
                        match channel.take() {
                            Some(item) => log.push(item.seq()),
                            None => break,
                        }
                    });
                }

                for i in 0..500u64 {
                    channel.publish(i);
                }
                channel.close();
            });

            assert_eq!((0..500).collect::<Vec<_>>(), *log.lock().unwrap());
        }
    }

    #[test]
    fn test_close_with_no_items() {
        for strategy in [WakeStrategy::Broadcast, WakeStrategy::Relay] {
            let per_consumer = fan_out(strategy, 16, 0);
            assert_eq!(16, per_consumer.len());
            assert!(per_consumer.iter().all(Vec::is_empty));
        }
    }

    #[test]
    fn test_take_after_close_never_blocks() {
        let channel = HandoffChannel::<u32>::new();
        channel.close();
        channel.close();
        assert!(channel.is_closed());

        let start = Instant::now();
        for _ in 0..100 {
            assert!(channel.take().is_none());
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_close_waits_for_last_item() {
        let channel = HandoffChannel::new();
        let close_returned = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                channel.publish("last");
                channel.close();
                close_returned.store(true, Release);
            });

            thread::sleep(Duration::from_millis(100));
            // The slot is still full, so `close()` can't have returned.
            assert!(!close_returned.load(Acquire));

            assert_eq!(Some("last"), channel.take().map(Item::into_value));
            assert_eq!(None, channel.take());
        });

        assert!(close_returned.load(Acquire));
    }

    #[test]
    #[should_panic(expected = "fill after close")]
    fn test_publish_after_close_panics() {
        let channel = HandoffChannel::new();
        channel.close();
        channel.publish(1);
    }

    #[test]
    fn test_take_timeout() {
        let channel = HandoffChannel::new();

        let start = Instant::now();
        assert_eq!(Err(TimedOut), channel.take_timeout(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));

        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                channel.publish(7);
            });
            let item = channel.take_timeout(Duration::from_secs(10)).unwrap().unwrap();
            assert_eq!((0, 7), item.into_parts());
        });

        channel.close();
        assert_eq!(Ok(None), channel.take_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_publish_timeout() {
        let channel = HandoffChannel::new();
        channel.publish_timeout(1, Duration::from_millis(10)).unwrap();

        assert_eq!(SlotState::Full, channel.state());
        let err = channel.publish_timeout(2, Duration::from_millis(50)).unwrap_err();
        assert_eq!(2, err.into_inner());
        assert_eq!(1, channel.published());

        assert_eq!(Some(1), channel.take().map(Item::into_value));
        channel.publish_timeout(3, Duration::from_millis(10)).unwrap();
        assert_eq!(Some((1, 3)), channel.take().map(Item::into_parts));
    }

    /// CPU time consumed by the calling thread.
    #[cfg(unix)]
    fn thread_cpu_time() -> Duration {
        use libc::{clock_gettime, timespec, CLOCK_THREAD_CPUTIME_ID};
        let mut ts = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec.
        let rc = unsafe { clock_gettime(CLOCK_THREAD_CPUTIME_ID, &mut ts) };
        assert_eq!(0, rc);
        Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
    }

    // Check that a blocked consumer really waits, without wasting processor time busy-waiting.
    #[cfg(unix)]
    #[test]
    fn test_blocked_consumer_does_not_spin() {
        let channel = HandoffChannel::new();

        let (cpu, wall) = thread::scope(|s| {
            let consumer = s.spawn(|| {
                let wall = Instant::now();
                let cpu = thread_cpu_time();
                assert_eq!(Some("wake up"), channel.take().map(Item::into_value));
                (thread_cpu_time() - cpu, wall.elapsed())
            });

            thread::sleep(Duration::from_secs(2));
            channel.publish("wake up");
            channel.close();
            consumer.join().unwrap()
        });

        println!("idle consumer: cpu = {cpu:?}, wall = {wall:?}");
        assert!(wall >= Duration::from_millis(1500));
        assert!(cpu < Duration::from_millis(200));
    }
}
