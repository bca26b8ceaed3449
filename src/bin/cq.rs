#[macro_use]
extern crate clap;
#[macro_use]
extern crate slog;

use clap::{Arg, ArgMatches};
use slog::Drain;
use std::env;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use cq::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use cq::{Dispatcher, FileSink, MemQueue, OrderedStore, Producer, Result};

fn main() {
    if let Err(err) = run() {
        use std::error::Error;

        eprintln!("Error: {}", err);

        let mut source: &dyn Error = &err;
        while let Some(err) = source.source() {
            eprintln!("Caused by: {}", err);
            source = err;
        }
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let root = slog::Logger::root(drain, o!());

    let matches = app_from_crate!()
        .about("Reads commands from stdin and applies them to an in-memory ordered store")
        .arg(Arg::with_name("workers").long("workers").takes_value(true)
            .help("Maximum number of commands run at once"))
        .arg(Arg::with_name("capacity").long("capacity").takes_value(true)
            .help("Number of messages the queue buffers"))
        .arg(Arg::with_name("output-dir").long("output-dir").takes_value(true)
            .help("Directory query results are written to"))
        .get_matches();

    let workers = value_or(&matches, "workers", DEFAULT_WORKERS);
    let capacity = value_or(&matches, "capacity", DEFAULT_QUEUE_CAPACITY);
    let output_dir = match matches.value_of("output-dir") {
        Some(dir) => PathBuf::from(dir),
        None => env::current_dir()?,
    };

    info!(root, "Starting";
        "version" => crate_version!(),
        "workers" => workers,
        "output_dir" => output_dir.to_str());

    let queue = Arc::new(MemQueue::new(capacity));
    let dispatcher = Dispatcher::new(
        root.new(o!("component" => "dispatcher")),
        Arc::clone(&queue),
        Arc::new(OrderedStore::new()),
        Arc::new(FileSink::new(output_dir)),
        workers,
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let cancel = CancellationToken::new();
        watch_ctrl_c(&root, cancel.clone());

        let log = root.new(o!("component" => "producer"));
        let stdin = BufReader::new(tokio::io::stdin());
        let producer = Producer::new(log.clone(), stdin, Arc::clone(&queue));
        tokio::spawn(async move {
            if let Err(error) = producer.run().await {
                warn!(log, "Failed to read input: {}", error);
            }
            queue.close();
        });

        let result = dispatcher.run(cancel).await;
        dispatcher.drain().await;
        result
    });

    let stats = dispatcher.stats();
    info!(root, "Finished";
        "processed" => stats.processed,
        "rejected" => stats.rejected,
        "sink_failures" => stats.sink_failures);

    // Stdin may still be blocked on a read after Ctrl-C.
    runtime.shutdown_background();
    result
}

fn watch_ctrl_c(log: &slog::Logger, cancel: CancellationToken) {
    let log = log.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(log, "Interrupted");
            cancel.cancel();
        }
    });
}

fn value_or<T: FromStr>(matches: &ArgMatches, name: &str, default: T) -> T {
    match value_t!(matches, name, T) {
        Ok(value) => value,
        Err(ref err) if err.kind == clap::ErrorKind::ArgumentNotFound => default,
        Err(err) => err.exit(),
    }
}
