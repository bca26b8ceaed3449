//! A command processor that applies textual commands from a queue to an ordered key value store.
//!
//! Messages such as `addItem('k', 'v')` or `getAllItems()` are taken from a [`Queue`], parsed
//! into [`Command`]s and applied to an [`OrderedStore`] by a [`Dispatcher`], which runs a bounded
//! number of them at once. Query results are written to a [`Sink`].
//!
//! [`Queue`]: trait.Queue.html
//! [`Command`]: enum.Command.html
//! [`OrderedStore`]: struct.OrderedStore.html
//! [`Dispatcher`]: struct.Dispatcher.html
//! [`Sink`]: trait.Sink.html

#![deny(missing_docs)]

mod client;
mod command;
mod dispatcher;
mod error;
mod producer;
mod protocol;
mod queue;
mod server;
mod sink;
mod store;

pub use crate::client::Client;
pub use crate::command::{Command, Kind};
pub use crate::dispatcher::{DispatchStats, Dispatcher};
pub use crate::error::{Error, Result};
pub use crate::producer::Producer;
pub use crate::protocol::{ErrorKind, Request, Response};
pub use crate::queue::{MemQueue, Queue};
pub use crate::server::QueueServer;
pub use crate::sink::{format_entry, FileSink, Sink, ALL_ITEMS};
pub use crate::store::OrderedStore;

/// The default address for the queue server.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:4000";

/// The default number of commands run at once.
pub const DEFAULT_WORKERS: u32 = 4;

/// The default number of messages a queue buffers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// The default number of connections a [`QueueServer`] serves at once.
///
/// [`QueueServer`]: struct.QueueServer.html
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;
