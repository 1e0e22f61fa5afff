//! Command queue: FIFO correlation of commands with responses.
//!
//! The VSCP tcp/ip link has no request ids. The server answers commands in
//! the order it received them, so the oldest outstanding command owns the
//! next complete response frame. Out-of-order replies are not supported and
//! would corrupt correlation.
//!
//! Each [`PendingCommand`] carries a oneshot sender. Settling consumes the
//! command, so a command is settled exactly once and never twice.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Result, VscpError};
use crate::protocol::{Command, ResponseFrame};

/// Connection mode change tied to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModeChange {
    /// No mode change.
    None,
    /// Switch to receive-loop dispatch once the reply is positive.
    EnterLoopOnSuccess,
    /// Keep receive-loop dispatch until the reply arrives, then switch back
    /// to response dispatch if it is positive.
    LeaveLoop,
    /// A positive reply announces that the server closes the connection.
    CloseOnSuccess,
}

/// A command waiting for its response frame.
#[derive(Debug)]
pub(crate) struct PendingCommand {
    command: Command,
    mode: ModeChange,
    reply: oneshot::Sender<Result<ResponseFrame>>,
}

impl PendingCommand {
    /// Create a pending command and the future that observes its settlement.
    pub fn new(command: Command, mode: ModeChange) -> (Self, PendingReply) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                command,
                mode,
                reply: tx,
            },
            PendingReply { rx },
        )
    }

    #[inline]
    pub fn command(&self) -> &Command {
        &self.command
    }

    #[inline]
    pub fn mode(&self) -> ModeChange {
        self.mode
    }

    /// Settle with a frame or an error.
    ///
    /// Returns `false` if the caller already dropped its [`PendingReply`].
    pub fn settle(self, result: Result<ResponseFrame>) -> bool {
        self.reply.send(result).is_ok()
    }
}

/// Awaitable settlement of one command.
///
/// Resolves to the response frame, whatever its outcome, or to
/// [`VscpError::ConnectionClosed`] if the connection went away first.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<ResponseFrame>>,
}

impl Future for PendingReply {
    type Output = Result<ResponseFrame>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(VscpError::ConnectionClosed)))
    }
}

/// Ordered list of in-flight commands.
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    pending: VecDeque<PendingCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail.
    pub fn enqueue(&mut self, command: PendingCommand) {
        self.pending.push_back(command);
    }

    /// Remove the head, or `None` if nothing is outstanding.
    pub fn dequeue_head(&mut self) -> Option<PendingCommand> {
        self.pending.pop_front()
    }

    /// Settle every outstanding command with an error produced by
    /// `make_error` and empty the queue. Returns how many were drained.
    pub fn drain_with_error(&mut self, make_error: impl Fn() -> VscpError) -> usize {
        let count = self.pending.len();
        for pending in self.pending.drain(..) {
            pending.settle(Err(make_error()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Outcome;

    fn pending(verb: &str) -> (PendingCommand, PendingReply) {
        PendingCommand::new(Command::new(verb, None).unwrap(), ModeChange::None)
    }

    fn ok_frame(line: &str) -> ResponseFrame {
        ResponseFrame::new(vec![line.to_string()], "+OK".into(), Outcome::Success)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let mut queue = CommandQueue::new();
        let (a, reply_a) = pending("NOOP");
        let (b, reply_b) = pending("VERSION");
        queue.enqueue(a);
        queue.enqueue(b);

        let head = queue.dequeue_head().unwrap();
        assert_eq!(head.command().verb(), "NOOP");
        head.settle(Ok(ok_frame("first")));
        let head = queue.dequeue_head().unwrap();
        assert_eq!(head.command().verb(), "VERSION");
        head.settle(Ok(ok_frame("second")));

        assert_eq!(reply_a.await.unwrap().lines(), ["first"]);
        assert_eq!(reply_b.await.unwrap().lines(), ["second"]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_dequeue_empty_returns_none() {
        let mut queue = CommandQueue::new();
        assert!(queue.dequeue_head().is_none());
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_drain_with_error() {
        let mut queue = CommandQueue::new();
        let (a, reply_a) = pending("NOOP");
        let (b, reply_b) = pending("NOOP");
        queue.enqueue(a);
        queue.enqueue(b);

        let drained = queue.drain_with_error(|| VscpError::ConnectionClosed);

        assert_eq!(drained, 2);
        assert_eq!(queue.len(), 0);
        assert!(matches!(reply_a.await, Err(VscpError::ConnectionClosed)));
        assert!(matches!(reply_b.await, Err(VscpError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_dropped_sender_reads_as_closed() {
        let (cmd, reply) = pending("NOOP");
        drop(cmd);
        assert!(matches!(reply.await, Err(VscpError::ConnectionClosed)));
    }

    #[test]
    fn test_settle_after_reply_dropped() {
        let (cmd, reply) = pending("NOOP");
        drop(reply);
        assert!(!cmd.settle(Ok(ok_frame("x"))));
    }
}
