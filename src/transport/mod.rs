//! Transport module - byte stream connection to the VSCP daemon.
//!
//! Provides TCP connect with a connect-phase timeout. Any other
//! `AsyncRead + AsyncWrite` stream can be attached to a client instead
//! (see [`Client::connect_stream`](crate::Client::connect_stream)).

mod tcp;

pub(crate) use tcp::split;
pub use tcp::{connect, BoxedReader, BoxedWriter, TransportStream};
