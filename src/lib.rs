//! # vscp-client
//!
//! Async client for the VSCP tcp/ip link protocol (default port 9598).
//!
//! The protocol is line oriented: the client sends `VERB[ ARG]\r\n`, the
//! server answers with payload lines closed by a `+OK` or `-OK` terminator.
//! After `RCVLOOP` the server streams event lines instead.
//!
//! ## Architecture
//!
//! - **Transport**: TCP (or any `AsyncRead + AsyncWrite` stream), a writer
//!   task and a read loop
//! - **Frame assembly**: [`protocol::FrameBuffer`] reassembles responses and
//!   event lines from arbitrarily fragmented reads
//! - **Command queue**: replies carry no ids and are matched to the oldest
//!   outstanding command
//! - **State machine**: `Disconnected`, `Connected`, `RcvLoop`
//! - **Façade**: typed operations such as [`Client::get_remote_version`]
//!
//! ## Example
//!
//! ```ignore
//! use vscp_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> vscp_client::Result<()> {
//!     let client = Client::builder().host("localhost").build();
//!     client.connect().await?;
//!     client.login("admin", "secret").await?;
//!
//!     client.on_event(|event| println!("{}", event.to_line()));
//!     client.start_rcv_loop().await?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod transport;

mod client;
mod queue;
mod session;
mod writer;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{Result, ServerError, VscpError};
pub use listener::ListenerId;
pub use protocol::{Event, Guid};
pub use queue::PendingReply;
pub use session::ConnectionState;
