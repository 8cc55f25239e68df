//! Stream transports named by a descriptor.

use crate::descriptor::Network;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Connect to `address` over `network` and split the stream.
pub async fn connect(network: Network, address: &str) -> io::Result<(BoxedReader, BoxedWriter)> {
    match network {
        Network::Tcp => Ok(split_tcp(TcpStream::connect(address).await?)),
        #[cfg(unix)]
        Network::Unix => Ok(split_unix(tokio::net::UnixStream::connect(address).await?)),
        #[cfg(not(unix))]
        Network::Unix => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not available on this platform",
        )),
    }
}

pub fn split_tcp(stream: TcpStream) -> (BoxedReader, BoxedWriter) {
    let _ = stream.set_nodelay(true);
    let (read, write) = stream.into_split();
    (Box::new(read), Box::new(write))
}

#[cfg(unix)]
pub fn split_unix(stream: tokio::net::UnixStream) -> (BoxedReader, BoxedWriter) {
    let (read, write) = stream.into_split();
    (Box::new(read), Box::new(write))
}
