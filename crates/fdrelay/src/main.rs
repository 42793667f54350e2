//! fdrelay
//!
//! Relays bytes between pairs of inherited file descriptors until every
//! channel reaches end of stream.

use clap::Parser;
use tracing::info;

use fdrelay::event_loop::EventLoop;
use fdrelay_core::channel::ChannelSpec;
use fdrelay_core::config;
use fdrelay_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "fdrelay")]
#[command(
    version,
    about = "Relay bytes between pairs of inherited file descriptors"
)]
struct Args {
    /// Relay channels, one `<source-fd>:<dest-fd>` pair per channel.
    #[arg(required = true, value_name = "SRC:DST")]
    channels: Vec<ChannelSpec>,

    /// Trace registry and channel state around each dispatch batch.
    #[arg(short, long)]
    verbose: bool,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        channels = args.channels.len(),
        "Starting fdrelay"
    );

    let (table, registry) = config::build_tables(&args.channels)?;

    let mut event_loop = EventLoop::new(table, registry);
    event_loop.run()?;

    info!("All channels drained");
    Ok(())
}
