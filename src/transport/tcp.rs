//! TCP transport.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use vscp_client::transport::connect;
//!
//! let stream = connect("localhost", 9598, Duration::from_secs(5)).await?;
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{Result, VscpError};

/// Any byte stream a client can run over.
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> TransportStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Read half of a split transport stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a split transport stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Open a TCP connection, failing with [`VscpError::ConnectTimeout`] if it is
/// not established within `timeout`.
///
/// Exactly one outcome is reported: the stream, the I/O error raised while
/// connecting, or the timeout.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    tracing::debug!("connecting to {}:{}", host, port);

    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            // Small command lines; do not wait for Nagle.
            stream.set_nodelay(true)?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(VscpError::Io(e)),
        Err(_) => Err(VscpError::ConnectTimeout(timeout)),
    }
}

/// Split a stream into boxed read and write halves.
pub(crate) fn split<S: TransportStream>(stream: S) -> (BoxedReader, BoxedWriter) {
    let (reader, writer) = tokio::io::split(stream);
    (Box::new(reader), Box::new(writer))
}
