use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Defines the ordered message channel consumed by [`Dispatcher`].
///
/// [`Dispatcher`]: struct.Dispatcher.html
#[async_trait]
pub trait Queue: Send + Sync {
    /// Append a message to the queue, waiting for buffer space if necessary.
    async fn send_message(&self, message: String) -> Result<()>;

    /// Take the receiving end of the queue.
    ///
    /// Messages arrive in the order they were queued. The channel closing means no more messages
    /// will arrive. There is a single receiving end, so only the first call succeeds.
    fn receive_message(&self) -> Result<mpsc::Receiver<String>>;
}

/// An in-memory queue over a bounded channel.
///
/// ```
/// # #[tokio::main]
/// # async fn main() -> cq::Result<()> {
/// use cq::{MemQueue, Queue};
///
/// let queue = MemQueue::new(8);
/// queue.send_message("getAllItems()".to_owned()).await?;
/// queue.close();
///
/// let mut messages = queue.receive_message()?;
/// assert_eq!(messages.recv().await.as_deref(), Some("getAllItems()"));
/// assert_eq!(messages.recv().await, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemQueue {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
}

impl MemQueue {
    /// Construct a queue buffering up to `capacity` messages (at least 1).
    pub fn new(capacity: usize) -> MemQueue {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        MemQueue {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Stop accepting messages.
    ///
    /// Messages already queued are still delivered, after which the receiving end sees the end of
    /// the stream.
    pub fn close(&self) {
        lock(&self.sender).take();
    }

    /// A handle for feeding the queue from outside the async runtime.
    pub(crate) fn sender(&self) -> Result<mpsc::Sender<String>> {
        lock(&self.sender).clone().ok_or(Error::QueueClosed)
    }
}

#[async_trait]
impl Queue for MemQueue {
    async fn send_message(&self, message: String) -> Result<()> {
        let sender = self.sender()?;
        sender.send(message).await.map_err(|_| Error::QueueClosed)
    }

    fn receive_message(&self) -> Result<mpsc::Receiver<String>> {
        lock(&self.receiver).take().ok_or(Error::QueueUnavailable)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
