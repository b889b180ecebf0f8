use std::process;

use argh::FromArgs;
use fixed_heap::{DEFAULT_TOLERANCE, Heap, HeapConfig};
use log::{LevelFilter, info};
use snafu::ResultExt as _;
use snafu_utils::{GenericError, Report};

mod logger;
mod scenario;

const CAPACITY: usize = 64_000;

/// Run canned allocation sequences against a fixed 64000-byte heap.
#[derive(Debug, FromArgs)]
struct Args {
    /// smallest remainder in bytes worth splitting off a free chunk
    #[argh(option, default = "DEFAULT_TOLERANCE")]
    tolerance: usize,
    /// maximum log level: off, error, warn, info, debug or trace
    #[argh(option, default = "LevelFilter::Warn")]
    log_level: LevelFilter,
    /// print the free list and the allocated chunks when done
    #[argh(switch)]
    dump: bool,
    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Sequence(SequenceArgs),
    Reuse(ReuseArgs),
    Churn(ChurnArgs),
}

/// Allocate sizes 0..count, freeing every even-indexed allocation at once.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "sequence")]
struct SequenceArgs {
    /// number of allocations
    #[argh(option, default = "100")]
    count: usize,
}

/// Allocate almost the whole heap, free it and allocate it again.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "reuse")]
struct ReuseArgs {}

/// Pseudo-random allocations and frees, checking the heap after each call.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "churn")]
struct ChurnArgs {
    /// number of operations
    #[argh(option, default = "1000")]
    rounds: usize,
    /// random seed
    #[argh(option, default = "1")]
    seed: u64,
}

fn main() {
    let args: Args = argh::from_env();

    if let Err(err) = run(&args) {
        let location = err.location();
        let report = Report::new(err).at(location);
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), GenericError> {
    logger::init(args.log_level).whatever_context("failed to install logger")?;

    let mut heap = Heap::<CAPACITY>::new(HeapConfig::new().with_tolerance(args.tolerance));
    info!(
        "heap of {} bytes, tolerance {} bytes",
        heap.capacity(),
        heap.config().tolerance()
    );
    match &args.command {
        Command::Sequence(sequence) => scenario::sequence(&mut heap, sequence.count)?,
        Command::Reuse(ReuseArgs {}) => scenario::reuse(&mut heap)?,
        Command::Churn(churn) => scenario::churn(&mut heap, churn.rounds, churn.seed)?,
    }

    println!("{}", heap.stats());
    if args.dump {
        print!("{}", heap.dump());
    }
    Ok(())
}
