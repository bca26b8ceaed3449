use async_trait::async_trait;
use rmp_serde::decode::{from_read as read_mp, Error::InvalidMarkerRead};
use rmp_serde::encode::write as write_mp;
use slog::{debug, info, o, warn};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::{ErrorKind, Request, Response};
use crate::queue::{MemQueue, Queue};
use crate::DEFAULT_MAX_CONNECTIONS;

/// A queue fed over TCP.
///
/// Each connection carries a sequence of MessagePack-encoded [`Request`]s, each answered with a
/// [`Response`] once its message is queued. Messages from one connection are queued in the order
/// they were sent.
///
/// Every connection is served on its own thread. Connections beyond the server's limit are
/// answered with [`ErrorKind::Busy`] and closed.
///
/// [`ErrorKind::Busy`]: enum.ErrorKind.html#variant.Busy
pub struct QueueServer {
    local_addr: SocketAddr,
    queue: MemQueue,
}

impl QueueServer {
    /// Bind a listener and start accepting connections on a background thread.
    ///
    /// The queue buffers up to `capacity` messages, and at most [`DEFAULT_MAX_CONNECTIONS`]
    /// connections are served at once.
    ///
    /// [`DEFAULT_MAX_CONNECTIONS`]: constant.DEFAULT_MAX_CONNECTIONS.html
    pub fn bind<A: ToSocketAddrs>(log: slog::Logger, address: A, capacity: usize) -> Result<Self> {
        QueueServer::bind_with_limit(log, address, capacity, DEFAULT_MAX_CONNECTIONS)
    }

    /// Like [`bind`], but serving at most `max_connections` connections at once (at least 1).
    ///
    /// [`bind`]: #method.bind
    pub fn bind_with_limit<A: ToSocketAddrs>(
        log: slog::Logger,
        address: A,
        capacity: usize,
        max_connections: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address)?;
        let local_addr = listener.local_addr()?;
        let queue = MemQueue::new(capacity);
        let sender = queue.sender()?;

        let max_connections = max_connections.max(1);
        let log = log.new(o!("address" => local_addr));
        info!(log, "Accepting messages"; "max_connections" => max_connections);
        thread::Builder::new()
            .name("queue-server".to_owned())
            .spawn(move || accept(log, listener, sender, max_connections))?;

        Ok(QueueServer { local_addr, queue })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Queue for QueueServer {
    async fn send_message(&self, message: String) -> Result<()> {
        self.queue.send_message(message).await
    }

    fn receive_message(&self) -> Result<mpsc::Receiver<String>> {
        self.queue.receive_message()
    }
}

fn accept(
    log: slog::Logger,
    listener: TcpListener,
    sender: mpsc::Sender<String>,
    max_connections: usize,
) {
    let active = Arc::new(AtomicUsize::new(0));

    for connection in listener.incoming() {
        let stream = match connection {
            Ok(stream) => stream,
            Err(error) => {
                warn!(log, "Failed connection due to: {}", error);
                continue;
            }
        };

        let peer_addr = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        let log = log.new(o!("peer_addr" => peer_addr));

        // Only this thread increments, so the check can't be raced past the limit.
        if active.load(Ordering::SeqCst) >= max_connections {
            warn!(log, "Refusing connection"; "max_connections" => max_connections);
            refuse(&log, stream);
            continue;
        }
        active.fetch_add(1, Ordering::SeqCst);

        let active = Arc::clone(&active);
        let sender = sender.clone();
        thread::spawn(move || {
            if let Err(error) = handle_stream(&log, stream, &sender) {
                warn!(log, "Connection error: {}", error);
            }
            active.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

fn refuse(log: &slog::Logger, mut stream: TcpStream) {
    let response = Response::Err {
        kind: ErrorKind::Busy,
        message: "Server is busy".to_owned(),
    };
    if let Err(error) = write_mp(&mut stream, &response) {
        debug!(log, "Failed to refuse connection: {}", error);
    }
}

fn handle_stream(
    log: &slog::Logger,
    mut stream: TcpStream,
    sender: &mpsc::Sender<String>,
) -> Result<()> {
    debug!(log, "Client connected");

    loop {
        let request = match read_mp(&stream) {
            Ok(request) => request,
            Err(InvalidMarkerRead(ref err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(log, "Client disconnected");
                return Ok(());
            }
            Err(error) => {
                warn!(log, "Invalid request: {}", error);
                let response: Response = error.into();
                write_mp(&mut stream, &response)?;
                return Ok(());
            }
        };

        let response = match request {
            Request::Send { message } => {
                debug!(log, "Queueing message"; "message" => &message);
                match sender.blocking_send(message) {
                    Ok(()) => Response::Ok,
                    Err(_) => Response::Err {
                        kind: ErrorKind::QueueClosed,
                        message: Error::QueueClosed.to_string(),
                    },
                }
            }
        };
        write_mp(&mut stream, &response)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::dispatcher::Dispatcher;
    use crate::sink::FileSink;
    use crate::store::OrderedStore;
    use std::fs;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn discard() -> slog::Logger {
        slog::Logger::root(slog::Discard, o!())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queues_messages_from_clients_in_order() {
        let server = QueueServer::bind(discard(), "127.0.0.1:0", 16).unwrap();
        let mut messages = server.receive_message().unwrap();
        let address = server.local_addr();

        tokio::task::spawn_blocking(move || {
            let mut client = Client::connect(address).unwrap();
            for line in &["addItem('a', '1')", "getItem('a')", "getAllItems()"] {
                client.send(line.to_string()).unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(messages.recv().await.as_deref(), Some("addItem('a', '1')"));
        assert_eq!(messages.recv().await.as_deref(), Some("getItem('a')"));
        assert_eq!(messages.recv().await.as_deref(), Some("getAllItems()"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_messages_share_the_queue() {
        let server = QueueServer::bind(discard(), "127.0.0.1:0", 4).unwrap();
        let mut messages = server.receive_message().unwrap();

        server.send_message("getAllItems()".to_owned()).await.unwrap();
        assert_eq!(messages.recv().await.as_deref(), Some("getAllItems()"));
    }

    #[test]
    fn closed_queue_is_reported_to_the_client() {
        let server = QueueServer::bind(discard(), "127.0.0.1:0", 4).unwrap();
        drop(server.receive_message().unwrap());

        let mut client = Client::connect(server.local_addr()).unwrap();
        match client.send("getAllItems()".to_owned()) {
            Err(Error::Remote(message)) => assert_eq!(message, Error::QueueClosed.to_string()),
            other => panic!("expected a remote error, got {:?}", other),
        }
    }

    #[test]
    fn undecodable_request_gets_an_error_response() {
        let server = QueueServer::bind(discard(), "127.0.0.1:0", 4).unwrap();
        let _messages = server.receive_message().unwrap();

        let mut stream = TcpStream::connect(server.local_addr()).unwrap();
        // 0xc1 is a reserved MessagePack marker.
        stream.write_all(&[0xc1]).unwrap();

        let response: Response = read_mp(&stream).unwrap();
        match response {
            Response::Err { kind, .. } => assert_eq!(kind, ErrorKind::InvalidRequest),
            Response::Ok => panic!("expected an error response"),
        }
    }

    #[test]
    fn connections_over_the_limit_are_refused() {
        let server = QueueServer::bind_with_limit(discard(), "127.0.0.1:0", 16, 1).unwrap();
        let _messages = server.receive_message().unwrap();
        let address = server.local_addr();

        let mut first = Client::connect(address).unwrap();
        first.send("getAllItems()".to_owned()).unwrap();

        let mut second = Client::connect(address).unwrap();
        assert!(second.send("getAllItems()".to_owned()).is_err());

        // The slot frees once the first connection's thread sees EOF.
        drop(first);
        let mut accepted = false;
        for _ in 0..100 {
            let mut client = Client::connect(address).unwrap();
            if client.send("getAllItems()".to_owned()).is_ok() {
                accepted = true;
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(accepted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatches_commands_sent_by_a_client() {
        let temp_dir = TempDir::new().unwrap();
        let server = QueueServer::bind(discard(), "127.0.0.1:0", 16).unwrap();
        let address = server.local_addr();
        let dispatcher = Arc::new(Dispatcher::new(
            discard(),
            Arc::new(server),
            Arc::new(OrderedStore::new()),
            Arc::new(FileSink::new(temp_dir.path())),
            1,
        ));

        let cancel = CancellationToken::new();
        let running = {
            let dispatcher = Arc::clone(&dispatcher);
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.run(cancel).await })
        };

        tokio::task::spawn_blocking(move || {
            let mut client = Client::connect(address).unwrap();
            for line in &[
                "addItem('key1', 'value1')",
                "addItem('key2', 'value2')",
                "deleteItem('key1')",
                "getItem('key2')",
                "getAllItems()",
            ] {
                client.send(line.to_string()).unwrap();
            }
        })
        .await
        .unwrap();

        for _ in 0..100 {
            if dispatcher.stats().processed == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cancel.cancel();
        running.await.unwrap().unwrap();
        dispatcher.drain().await;

        assert_eq!(dispatcher.stats().processed, 5);
        let read = |name: &str| fs::read_to_string(temp_dir.path().join(name)).unwrap();
        assert_eq!(read("key2_1"), "key2 : value2\n");
        assert_eq!(read("all_items_2"), "key2 : value2\n");
    }
}
