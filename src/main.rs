//! # Handoff
//!
//! Streams the lines of a file from one producer thread to a pool of consumer threads
//! through a single-slot handoff channel, then reports how many lines each thread handled.
//!
//! ```shell
//! handoff --consumers 8 --wake relay Cargo.toml
//! HANDOFF_LOG=trace handoff --quiet Cargo.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use handoff::source::LineSource;
use handoff::{driver, HandoffConfig, WakeStrategy};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Arguments {
    /// File to read lines from.
    file: PathBuf,

    /// Number of consumer threads.
    #[arg(long, short, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..))]
    consumers: u16,

    /// How closing the channel wakes blocked consumers: "broadcast" or "relay".
    #[arg(long, default_value_t = WakeStrategy::Broadcast)]
    wake: WakeStrategy,

    /// Only print the per-thread totals.
    #[arg(long, short)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::WARN.into())
                    .with_env_var("HANDOFF_LOG")
                    .from_env()?,
            )
            .with_writer(std::io::stderr)
            .compact()
            .finish(),
    )?;

    let source = LineSource::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let config = HandoffConfig::default().with_wake_on_close(args.wake);

    let result = driver::run(source, usize::from(args.consumers), config, |delivery, item| {
        if !args.quiet {
            println!(
                "consumer {}: [{}:{}] {}",
                delivery.consumer,
                delivery.index,
                item.seq(),
                item.value()
            );
        }
    });
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(label = err.as_label(), error = %err, "run failed");
            return Err(err).with_context(|| format!("failed to stream {}", args.file.display()));
        }
    };

    println!("producer: {} lines", report.producer.produced);
    for consumer in &report.consumers {
        println!("consumer {}: {} lines", consumer.id, consumer.consumed);
    }

    Ok(())
}
