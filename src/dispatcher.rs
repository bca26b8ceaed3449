use slog::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::queue::Queue;
use crate::sink::{format_entry, Sink, ALL_ITEMS};
use crate::store::OrderedStore;

/// Counts of the messages handled by a [`Dispatcher`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages that parsed as valid commands and were applied to the store.
    pub processed: u64,

    /// Messages that were not valid commands.
    pub rejected: u64,

    /// Query results that could not be written to the sink.
    pub sink_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    rejected: AtomicU64,
    sink_failures: AtomicU64,
}

/// Consumes command messages from a queue, running up to a fixed number of them at once.
///
/// Messages are taken from the queue in order, but each runs as an independent task, so with
/// more than one worker their effects on the store and sink may complete in any order.
pub struct Dispatcher<Q, S> {
    log: slog::Logger,
    queue: Arc<Q>,
    handler: Arc<Handler<S>>,
    slots: Arc<Semaphore>,
    workers: u32,
}

struct Handler<S> {
    log: slog::Logger,
    store: Arc<OrderedStore>,
    sink: Arc<S>,
    counters: Counters,
}

impl<Q: Queue, S: Sink + 'static> Dispatcher<Q, S> {
    /// Construct a dispatcher running at most `workers` commands at once (at least 1).
    pub fn new(
        log: slog::Logger,
        queue: Arc<Q>,
        store: Arc<OrderedStore>,
        sink: Arc<S>,
        workers: u32,
    ) -> Self {
        let workers = workers.max(1);
        Dispatcher {
            handler: Arc::new(Handler {
                log: log.clone(),
                store,
                sink,
                counters: Counters::default(),
            }),
            log,
            queue,
            slots: Arc::new(Semaphore::new(workers as usize)),
            workers,
        }
    }

    /// Consume messages until `cancel` fires or the queue ends.
    ///
    /// Fails only if the queue can't be received from. Invalid commands and sink failures are
    /// logged and counted without stopping the loop. When a message arrives and every worker is
    /// busy, the loop waits for one to finish before taking the next message.
    ///
    /// Cancellation is checked between messages. Commands already started are not waited for;
    /// use [`drain`] for that.
    ///
    /// [`drain`]: #method.drain
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut messages = self.queue.receive_message()?;
        info!(self.log, "Dispatching commands"; "workers" => self.workers);

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(self.log, "Dispatcher cancelled");
                    return Ok(());
                }
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => {
                        info!(self.log, "Queue closed");
                        return Ok(());
                    }
                },
            };

            // The semaphore is never closed.
            let permit = match Arc::clone(&self.slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Ok(()),
            };
            let handler = Arc::clone(&self.handler);
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                handler.handle(&message);
            });
        }
    }

    /// Wait until no command is running.
    pub async fn drain(&self) {
        if let Ok(permits) = self.slots.acquire_many(self.workers).await {
            drop(permits);
        }
    }

    /// Parse and apply a single message on the calling thread, bypassing the queue.
    pub fn process(&self, message: &str) -> Result<()> {
        self.handler.process(message)
    }

    /// The counts of messages handled so far.
    pub fn stats(&self) -> DispatchStats {
        let counters = &self.handler.counters;
        DispatchStats {
            processed: counters.processed.load(Ordering::SeqCst),
            rejected: counters.rejected.load(Ordering::SeqCst),
            sink_failures: counters.sink_failures.load(Ordering::SeqCst),
        }
    }

    /// The store commands are applied to.
    pub fn store(&self) -> &Arc<OrderedStore> {
        &self.handler.store
    }
}

impl<S: Sink> Handler<S> {
    fn handle(&self, message: &str) {
        match self.process(message) {
            Ok(()) => {}
            Err(error @ Error::InvalidCommand(_)) => {
                warn!(self.log, "Rejected message: {}", error);
            }
            Err(error) => {
                warn!(self.log, "Command failed: {}", error; "message" => message);
            }
        }
    }

    fn process(&self, message: &str) -> Result<()> {
        let command = match Command::parse(message) {
            Ok(command) => command,
            Err(error) => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                return Err(error);
            }
        };
        debug!(self.log, "Applying command"; "command" => %command);

        let result = self.apply(command);
        self.counters.processed.fetch_add(1, Ordering::SeqCst);
        if result.is_err() {
            self.counters.sink_failures.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    fn apply(&self, command: Command) -> Result<()> {
        match command {
            Command::Add { key, value } => {
                self.store.set(key, value);
                Ok(())
            }
            Command::Delete { key } => {
                self.store.delete(&key);
                Ok(())
            }
            Command::Get { key } => match self.store.get(&key) {
                Some(value) => self.sink.write(&key, &format_entry(&key, &value)),
                None => {
                    debug!(self.log, "Key not found"; "key" => &key);
                    Ok(())
                }
            },
            Command::GetAll => {
                let (keys, values) = self.store.snapshot();
                let content: String = keys
                    .iter()
                    .zip(&values)
                    .map(|(key, value)| format_entry(key, value))
                    .collect();
                self.sink.write(ALL_ITEMS, &content)
            }
        }
    }
}
