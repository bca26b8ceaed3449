use serde::{Deserialize, Serialize};

/// An enum representing a request to a queue server.
#[derive(Debug, Deserialize, Serialize)]
pub enum Request {
    /// Append a message to the server's queue.
    ///
    /// The server will respond with [`Ok`] once the message is queued (or [`Err`]).
    Send {
        /// The command text.
        message: String,
    },
}

/// An enum representing a response from a queue server.
#[derive(Debug, Deserialize, Serialize)]
pub enum Response {
    /// Indicates that a request succeeded.
    Ok,

    /// Indicates that an error occurred whilst attempting to process a request.
    Err {
        /// The kind of error that occurred.
        kind: ErrorKind,

        /// An error message.
        message: String,
    },
}

/// An enum representing response error kinds.
#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum ErrorKind {
    /// Indicates that a request could not be decoded.
    InvalidRequest,

    /// Indicates that the queue no longer accepts messages.
    QueueClosed,

    /// Indicates that the server is already serving as many connections as it allows.
    Busy,
}

impl From<rmp_serde::decode::Error> for Response {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Response::Err {
            kind: ErrorKind::InvalidRequest,
            message: format!("{}", err),
        }
    }
}
