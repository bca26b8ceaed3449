/// An enum representing the errors that can occur while queueing, parsing and executing commands.
#[derive(Debug)]
pub enum Error {
    /// Indicates that a line of text is not a valid command. Carries the offending line.
    InvalidCommand(String),

    /// Indicates that a query result could not be written to its destination.
    SinkWrite {
        /// The unique destination name (`<base>_<n>`) that failed.
        name: String,

        /// The underlying IO failure.
        source: std::io::Error,
    },

    /// Wraps IO errors from the networked queue or command input.
    Io(std::io::Error),

    /// Wraps decoding errors that occur when reading protocol frames.
    Decode(rmp_serde::decode::Error),

    /// Wraps encoding errors that occur when writing protocol frames.
    Encode(rmp_serde::encode::Error),

    /// Indicates that a message was sent to a queue that has been closed.
    QueueClosed,

    /// Indicates that the receiving end of a queue has already been taken.
    QueueUnavailable,

    /// Indicates that a server failed to accept a request.
    Remote(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SinkWrite { source, .. } => Some(source),
            Error::Io(err) => Some(err),
            Error::Decode(err) => Some(err),
            Error::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidCommand(line) => write!(f, "Invalid command: {:?}", line),
            Error::SinkWrite { name, .. } => write!(f, "Failed to write output {}", name),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Decode(err) => write!(f, "Message decode error: {}", err),
            Error::Encode(err) => write!(f, "Message encode error: {}", err),
            Error::QueueClosed => write!(f, "Queue is closed"),
            Error::QueueUnavailable => write!(f, "Queue is already being received from"),
            Error::Remote(message) => write!(f, "Server error: {}", message),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Error {
        Error::Decode(err)
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Error {
        Error::Encode(err)
    }
}

/// A convenience `Result` alias that pins the error to our own.
pub type Result<V> = std::result::Result<V, Error>;
