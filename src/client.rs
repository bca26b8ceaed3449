use rmp_serde::decode::from_read as read_mp;
use rmp_serde::encode::write as write_mp;
use std::net::{TcpStream, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::protocol::{Request, Response};

/// Implements a producer for a [`QueueServer`].
///
/// [`QueueServer`]: struct.QueueServer.html
pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Connect to a server.
    pub fn connect<A: ToSocketAddrs>(address: A) -> Result<Client> {
        let stream = TcpStream::connect(address)?;
        Ok(Client { stream })
    }

    /// Send a message, returning once the server has queued it.
    pub fn send(&mut self, message: String) -> Result<()> {
        let request = Request::Send { message };
        write_mp(&mut self.stream, &request)?;
        let response = read_mp(&self.stream)?;

        match response {
            Response::Ok => Ok(()),
            Response::Err { message, .. } => Err(Error::Remote(message)),
        }
    }
}
