//! # Handoff
//!
//! ### A Single-Slot Producer/Multi-Consumer Channel
//!
//! One producer hands items, one at a time, to a pool of consumer threads.
//! The slot holds at most one item. The producer blocks while it is full, and consumers block while it
//! is empty. Blocking is done with a [`Mutex`](std::sync::Mutex) and two
//! [`Condvar`](std::sync::Condvar)s, never by spinning on a flag.
//!
//! When the source runs dry, the producer closes the channel,
//! and every consumer, however many are blocked at that moment, wakes up and sees the end of the stream.
//!
//! ```
//! use std::thread;
//!
//! let (producer, consumer) = handoff::channel();
//!
//! let workers: Vec<_> = (0..3)
//!     .map(|_| {
//!         let consumer = consumer.clone();
//!         thread::spawn(move || consumer.into_iter().count())
//!     })
//!     .collect();
//!
//! for line in ["a", "b", "c"] {
//!     producer.publish(line);
//! }
//! producer.close();
//!
//! let taken: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
//! assert_eq!(3, taken);
//! ```
//!
//! ## Modules
//!
//! - [`HandoffChannel`]: the channel itself, shared by reference.
//! - [`handle`]: [`Producer`]/[`Consumer`] handles that enforce a single producer.
//! - [`source`]: where the producer's items come from.
//! - [`driver`]: runs one producer and N consumers to completion.

mod channel;
mod config;
mod error;
mod slot;

pub mod driver;
pub mod handle;
pub mod source;

pub use channel::HandoffChannel;
pub use config::{HandoffConfig, ParseWakeStrategyError, WakeStrategy};
pub use error::{DriverError, PublishTimeoutError, TimedOut};
pub use handle::{channel, channel_with_config, Consumer, Producer};
pub use slot::{Item, SlotState};
