//! # Producer/Consumer Driver
//!
//! Wires a [`Source`] to a pool of consumer threads through one [`HandoffChannel`]:
//!
//! - one producer thread pulls items from the source and publishes them, then closes the channel;
//! - `consumers` consumer threads take items until the end of the stream and pass each one to the sink.
//!
//! Every thread hands its tally back through its join handle, and [`run`] returns them all
//! once every thread has been joined.
//!
//! A panicking sink does not stop its consumer: the item counts as taken and the consumer goes
//! on taking, so the producer is never left waiting for a slot nobody drains. The panic is
//! reported as [`DriverError::WorkerPanicked`] once the run is over.

use crate::channel::HandoffChannel;
use crate::config::HandoffConfig;
use crate::error::DriverError;
use crate::slot::Item;
use crate::source::Source;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ScopedJoinHandle};
use tracing::{debug, info, warn};

/// What the producer thread did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    pub produced: u64,
}

/// What one consumer thread did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerReport {
    pub id: usize,
    pub consumed: u64,
    /// Sequence number of the last item this consumer took.
    pub last_seq: Option<u64>,
    /// Items whose sink call panicked. They are included in `consumed`.
    pub sink_panics: u64,
}

/// Where an item ended up: which consumer took it, and how many items that consumer had taken before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub consumer: usize,
    /// Zero for the first item a consumer takes, then one more for each item after it.
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub producer: ProducerReport,
    /// Ordered by consumer id.
    pub consumers: Vec<ConsumerReport>,
}

impl RunReport {
    pub fn total_consumed(&self) -> u64 {
        self.consumers.iter().map(|c| c.consumed).sum()
    }
}

/// Streams every item of `source` to `consumers` worker threads.
///
/// `sink` is called on the consumer thread with the [`Delivery`] and the item that was taken.
///
/// The channel is closed even if reading the source fails, so the consumers always finish.
/// A source error or a panicking sink is reported after all threads have been joined.
pub fn run<S, F>(
    source: S,
    consumers: usize,
    config: HandoffConfig,
    sink: F,
) -> Result<RunReport, DriverError>
where
    S: Source + Send,
    S::Item: Send,
    F: Fn(Delivery, &Item<S::Item>) + Sync,
{
    if consumers == 0 {
        return Err(DriverError::NoConsumers);
    }

    let channel = HandoffChannel::with_config(config);
    let channel = &channel;
    let sink = &sink;

    thread::scope(|s| {
        let mut handles = Vec::with_capacity(consumers);
        for id in 0..consumers {
            let spawned = thread::Builder::new()
                .name(consumer_name(id))
                .spawn_scoped(s, move || consume(channel, id, sink));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    // Let the consumers that did start finish.
                    channel.close();
                    return Err(DriverError::Spawn(error));
                }
            }
        }

        let producer = thread::Builder::new()
            .name(String::from("handoff-producer"))
            .spawn_scoped(s, move || produce(channel, source));
        let producer = match producer {
            Ok(handle) => handle,
            Err(error) => {
                channel.close();
                return Err(DriverError::Spawn(error));
            }
        };

        info!(consumers, "producer and consumers started");

        let producer = join(producer).and_then(|report| report);
        // Join everything before looking at the results, so no worker outlives a failure report.
        let consumers: Vec<_> = handles.into_iter().map(join).collect();

        let report = RunReport {
            producer: producer?,
            consumers: consumers.into_iter().collect::<Result<_, _>>()?,
        };
        if let Some(failed) = report.consumers.iter().find(|c| c.sink_panics > 0) {
            return Err(DriverError::WorkerPanicked {
                worker: consumer_name(failed.id),
            });
        }
        info!(
            produced = report.producer.produced,
            consumed = report.total_consumed(),
            "all workers joined"
        );
        Ok(report)
    })
}

fn produce<S: Source>(
    channel: &HandoffChannel<S::Item>,
    mut source: S,
) -> Result<ProducerReport, DriverError> {
    // Closes the channel on every exit path, including a panicking source.
    let _close = CloseOnDrop(channel);

    let mut produced = 0;
    loop {
        match source.next_item() {
            Ok(Some(item)) => {
                channel.publish(item);
                produced += 1;
            }
            Ok(None) => break,
            Err(error) => {
                warn!(produced, %error, "source failed");
                return Err(DriverError::Source { produced, error });
            }
        }
    }

    debug!(produced, "source exhausted");
    Ok(ProducerReport { produced })
}

fn consume<T, F>(channel: &HandoffChannel<T>, id: usize, sink: &F) -> ConsumerReport
where
    F: Fn(Delivery, &Item<T>),
{
    let mut report = ConsumerReport {
        id,
        consumed: 0,
        last_seq: None,
        sink_panics: 0,
    };

    while let Some(item) = channel.take() {
        let delivery = Delivery {
            consumer: id,
            index: report.consumed,
        };
        if panic::catch_unwind(AssertUnwindSafe(|| sink(delivery, &item))).is_err() {
            warn!(id, seq = item.seq(), "sink panicked");
            report.sink_panics += 1;
        }
        report.consumed += 1;
        report.last_seq = Some(item.seq());
    }

    debug!(
        id,
        consumed = report.consumed,
        sink_panics = report.sink_panics,
        "consumer finished"
    );
    report
}

fn consumer_name(id: usize) -> String {
    format!("handoff-consumer-{id}")
}

fn join<T>(handle: ScopedJoinHandle<'_, T>) -> Result<T, DriverError> {
    let worker = handle.thread().name().unwrap_or("<unnamed>").to_owned();
    handle
        .join()
        .map_err(|_| DriverError::WorkerPanicked { worker })
}

struct CloseOnDrop<'a, T>(&'a HandoffChannel<T>);

impl<T> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.close();
    }
}
