//! Dedicated writer task for command lines.
//!
//! Commands are handed to the writer task through an mpsc channel instead of
//! writing to the socket directly. Handing off is synchronous, so the client
//! can enqueue a command and queue its wire bytes under one lock, which keeps
//! wire order equal to queue order.
//!
//! # Architecture
//!
//! ```text
//! send_command ─┐
//! noop          ─┼─► mpsc::UnboundedSender<OutboundLine> ─► Writer Task ─► TCP
//! read_var      ─┘
//! ```
//!
//! Writes are fire-and-forget: a write error ends the writer task and is
//! logged; the read loop then observes the closed socket.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, VscpError};
use crate::protocol::Command;

/// Maximum lines to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A command line ready to be written.
#[derive(Debug, Clone)]
pub struct OutboundLine {
    /// Encoded line including CRLF.
    pub bytes: Bytes,
}

impl OutboundLine {
    /// Encode a command.
    #[inline]
    pub fn new(command: &Command) -> Self {
        Self {
            bytes: command.encode(),
        }
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Handle for sending lines to the writer task.
///
/// Cheaply cloneable. Dropping every handle closes the channel, which makes
/// the writer task shut the write half down and exit.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<OutboundLine>,
}

impl WriterHandle {
    /// Queue a line for writing without waiting.
    ///
    /// Fails only if the writer task has already exited.
    pub fn send(&self, line: OutboundLine) -> Result<()> {
        self.tx
            .send(line)
            .map_err(|_| VscpError::ConnectionClosed)
    }

    /// Check if the writer task is gone.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending lines.
///
/// The returned `JoinHandle` completes when every handle is dropped (clean
/// shutdown) or a write fails.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = WriterHandle { tx };

    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer).await;
        if let Err(e) = &result {
            tracing::error!("Writer error: {}", e);
        }
        result
    });

    (handle, task)
}

/// Main writer loop - receives lines and writes them to the socket.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<OutboundLine>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(line) => line,
            None => {
                // All handles dropped: graceful close of the write half.
                let _ = writer.shutdown().await;
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(line) => batch.push(line),
                Err(_) => break,
            }
        }

        tracing::trace!("writing {} line(s)", batch.len());
        write_batch(&mut writer, &batch).await?;
    }
}

/// Write a batch of lines using scatter/gather I/O, continuing after
/// partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundLine]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundLine::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(VscpError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after the first `skip_bytes` bytes.
fn remaining_slices(batch: &[OutboundLine], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for line in batch {
        let end = offset + line.size();
        if skip_bytes < end {
            let start_in_line = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&line.bytes[start_in_line..]));
        }
        offset = end;
    }

    slices
}
