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
use tokio_util::sync::CancellationToken;

use cq::{DEFAULT_ADDRESS, DEFAULT_MAX_CONNECTIONS, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use cq::{Dispatcher, FileSink, OrderedStore, QueueServer, Result};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let root = slog::Logger::root(drain, o!());

    let matches = app_from_crate!()
        .about("Accepts commands over TCP and applies them to an in-memory ordered store")
        .arg(Arg::with_name("address").long("addr").takes_value(true))
        .arg(Arg::with_name("workers").long("workers").takes_value(true)
            .help("Maximum number of commands run at once"))
        .arg(Arg::with_name("capacity").long("capacity").takes_value(true)
            .help("Number of messages the queue buffers"))
        .arg(Arg::with_name("max-connections").long("max-connections").takes_value(true)
            .help("Maximum number of connections served at once"))
        .arg(Arg::with_name("output-dir").long("output-dir").takes_value(true)
            .help("Directory query results are written to"))
        .get_matches();

    let address = matches.value_of("address").unwrap_or(DEFAULT_ADDRESS);
    let workers = value_or(&matches, "workers", DEFAULT_WORKERS);
    let capacity = value_or(&matches, "capacity", DEFAULT_QUEUE_CAPACITY);
    let max_connections = value_or(&matches, "max-connections", DEFAULT_MAX_CONNECTIONS);
    let output_dir = match matches.value_of("output-dir") {
        Some(dir) => PathBuf::from(dir),
        None => env::current_dir()?,
    };

    info!(root, "Starting server";
        "version" => crate_version!(),
        "workers" => workers,
        "output_dir" => output_dir.to_str());

    let queue = QueueServer::bind_with_limit(
        root.new(o!("component" => "queue")),
        address,
        capacity,
        max_connections,
    )?;
    let dispatcher = Dispatcher::new(
        root.new(o!("component" => "dispatcher")),
        Arc::new(queue),
        Arc::new(OrderedStore::new()),
        Arc::new(FileSink::new(output_dir)),
        workers,
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let log = root.clone();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(log, "Interrupted");
                on_interrupt.cancel();
            }
        });

        let result = dispatcher.run(cancel).await;
        dispatcher.drain().await;

        let stats = dispatcher.stats();
        info!(root, "Stopped";
            "processed" => stats.processed,
            "rejected" => stats.rejected,
            "sink_failures" => stats.sink_failures);
        result
    })
}

fn value_or<T: FromStr>(matches: &ArgMatches, name: &str, default: T) -> T {
    match value_t!(matches, name, T) {
        Ok(value) => value,
        Err(ref err) if err.kind == clap::ErrorKind::ArgumentNotFound => default,
        Err(err) => err.exit(),
    }
}
