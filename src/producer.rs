use slog::{debug, info};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::Result;
use crate::queue::Queue;

/// Feeds lines of text into a queue, one message per non-blank line.
pub struct Producer<R, Q> {
    log: slog::Logger,
    reader: R,
    queue: Arc<Q>,
}

impl<R: AsyncBufRead + Unpin, Q: Queue> Producer<R, Q> {
    /// Construct a producer reading from `reader`.
    pub fn new(log: slog::Logger, reader: R, queue: Arc<Q>) -> Self {
        Producer { log, reader, queue }
    }

    /// Send every line until the reader is exhausted, returning the number of messages sent.
    ///
    /// Lines are trimmed and blank lines are skipped. Validity isn't checked here; that's the
    /// dispatcher's job.
    pub async fn run(self) -> Result<usize> {
        let mut lines = self.reader.lines();
        let mut sent = 0;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!(self.log, "Sending message"; "message" => line);
            self.queue.send_message(line.to_owned()).await?;
            sent += 1;
        }

        info!(self.log, "Input exhausted"; "sent" => sent);
        Ok(sent)
    }
}
