//! Protocol state machine.
//!
//! A [`Session`] owns the receive buffer and the command queue of one
//! connection and decides how incoming bytes are routed:
//!
//! ```text
//! Disconnected ──connect──► Connected ──RCVLOOP +OK──► RcvLoop
//!       ▲                      ▲   │                      │
//!       │                      │   └──────────────────────┤
//!       │                      └──── QUITLOOP +OK ────────┘
//!       └──────── end / close / error / disconnect ───────┘
//! ```
//!
//! - `Connected`: every complete frame settles the head of the queue.
//! - `RcvLoop`: every line is a heartbeat (`+OK`), an error marker (`-OK`),
//!   or an event to broadcast. After `QUITLOOP` is issued, events keep
//!   flowing until the first terminator other than a bare heartbeat, which
//!   is its reply.
//!
//! The session does no I/O. The client feeds it bytes and acts on the
//! returned [`Dispatch`] after releasing its lock, so listeners may issue new
//! commands from inside a callback.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError, VscpError};
use crate::protocol::{
    classify_terminator, verbs, Event, FrameBuffer, Outcome, ResponseFrame, POSITIVE_TOKEN,
};
use crate::queue::{CommandQueue, ModeChange, PendingCommand};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Command/response mode
    Connected,
    /// Continuous event delivery
    RcvLoop,
}

/// Work produced by one [`Session::feed`] call, to be carried out after the
/// session lock is released.
#[derive(Debug, Default)]
pub(crate) struct Dispatch {
    /// Events decoded in receive-loop mode, in arrival order.
    pub events: Vec<Event>,
    /// Error markers seen in receive-loop mode.
    pub loop_errors: Vec<ServerError>,
}

impl Dispatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.loop_errors.is_empty()
    }
}

/// Socket-free protocol engine for one connection.
pub(crate) struct Session {
    state: ConnectionState,
    buffer: FrameBuffer,
    queue: CommandQueue,
    /// `QUITLOOP` is outstanding; loop dispatch continues until it settles.
    leaving_loop: bool,
    /// The welcome banner settled positively.
    established: bool,
    /// The coming end of stream was requested or announced.
    close_expected: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            buffer: FrameBuffer::new(),
            queue: CommandQueue::new(),
            leaving_loop: false,
            established: false,
            close_expected: false,
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of commands still waiting for a reply.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether the welcome banner has been accepted. Failures before that
    /// belong to the caller of `connect`.
    #[inline]
    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Whether the end of stream is expected (`disconnect`, or a positive
    /// reply to `QUIT`).
    #[inline]
    pub fn close_expected(&self) -> bool {
        self.close_expected
    }

    /// Mark the coming end of stream as requested.
    pub fn expect_close(&mut self) {
        self.close_expected = true;
    }

    /// Enter `Connected` with the banner placeholder at the head of the
    /// queue. The placeholder is never written; the server's welcome
    /// banner settles it.
    pub fn open(&mut self, banner: PendingCommand) {
        self.buffer.clear();
        self.queue.drain_with_error(|| VscpError::ConnectionClosed);
        self.reset_flags();
        self.state = ConnectionState::Connected;
        self.queue.enqueue(banner);
        tracing::debug!("session opened");
    }

    /// Check whether `command` may be issued in the current state.
    pub fn check_issue(&self, command: &PendingCommand) -> Result<()> {
        let verb = command.command().verb();
        match self.state {
            ConnectionState::Disconnected => Err(VscpError::NotConnected),
            ConnectionState::Connected if command.mode() == ModeChange::LeaveLoop => Err(
                VscpError::InvalidState(format!("{} outside receive loop", verb)),
            ),
            ConnectionState::RcvLoop if self.leaving_loop => Err(VscpError::InvalidState(
                format!("{} while leaving receive loop", verb),
            )),
            ConnectionState::RcvLoop if command.mode() != ModeChange::LeaveLoop => Err(
                VscpError::InvalidState(format!("{} not allowed in receive loop", verb)),
            ),
            _ => Ok(()),
        }
    }

    /// Record an issued command at the tail of the queue.
    ///
    /// The caller has already passed [`check_issue`](Self::check_issue) and
    /// handed the wire bytes to the writer under the same lock.
    pub fn enqueue(&mut self, command: PendingCommand) {
        if command.mode() == ModeChange::LeaveLoop {
            tracing::debug!("leaving receive loop");
            self.leaving_loop = true;
        }
        self.queue.enqueue(command);
    }

    /// Append received bytes and route every complete frame or line.
    pub fn feed(&mut self, data: &[u8]) -> Dispatch {
        let mut dispatch = Dispatch::default();
        if self.state == ConnectionState::Disconnected {
            return dispatch;
        }

        self.buffer.extend(data);

        loop {
            match self.state {
                ConnectionState::Disconnected => break,
                ConnectionState::Connected => match self.buffer.next_frame() {
                    Some(frame) => self.settle_head(frame),
                    None => break,
                },
                ConnectionState::RcvLoop => match self.buffer.next_line() {
                    Some(line) => self.route_loop_line(&line, &mut dispatch),
                    None => break,
                },
            }
        }

        dispatch
    }

    /// Go to `Disconnected`: clear the buffer and settle every outstanding
    /// command with `ConnectionClosed`. Returns how many were drained.
    pub fn close(&mut self) -> usize {
        let was = self.state;
        self.state = ConnectionState::Disconnected;
        self.buffer.clear();
        self.reset_flags();
        let drained = self.queue.drain_with_error(|| VscpError::ConnectionClosed);
        if was != ConnectionState::Disconnected {
            tracing::debug!("session closed, {} pending command(s) failed", drained);
        }
        drained
    }

    fn reset_flags(&mut self) {
        self.leaving_loop = false;
        self.established = false;
        self.close_expected = false;
    }

    fn settle_head(&mut self, frame: ResponseFrame) {
        let Some(pending) = self.queue.dequeue_head() else {
            tracing::warn!(
                "Received unsolicited response frame, discarding: {:?}",
                frame.terminator()
            );
            return;
        };

        if pending.command().is(verbs::BANNER) {
            self.established = frame.is_success();
        }
        if frame.is_success() {
            match pending.mode() {
                ModeChange::EnterLoopOnSuccess => {
                    tracing::debug!("entering receive loop");
                    self.state = ConnectionState::RcvLoop;
                }
                ModeChange::LeaveLoop => {
                    tracing::debug!("receive loop left");
                    self.state = ConnectionState::Connected;
                }
                ModeChange::CloseOnSuccess => self.close_expected = true,
                ModeChange::None => {}
            }
        }

        tracing::trace!(
            "settling {} with {} line(s)",
            pending.command().verb(),
            frame.lines().len()
        );
        pending.settle(Ok(frame));
    }

    fn route_loop_line(&mut self, line: &str, dispatch: &mut Dispatch) {
        match classify_terminator(line.as_bytes()) {
            // While QUITLOOP is outstanding its reply is the first terminator
            // that is not a bare heartbeat.
            Some(outcome) if self.leaving_loop && !is_heartbeat(line) => {
                self.leaving_loop = false;
                let frame = ResponseFrame::new(Vec::new(), line.to_string(), outcome);
                self.settle_head(frame);
            }
            Some(Outcome::Success) => {
                tracing::trace!("receive loop heartbeat");
            }
            Some(Outcome::Failure) => {
                let frame = ResponseFrame::new(Vec::new(), line.to_string(), Outcome::Failure);
                let error = frame.server_error();
                tracing::warn!("error marker in receive loop: {}", error);
                dispatch.loop_errors.push(error);
            }
            None => match Event::parse_line(line) {
                Ok(event) => dispatch.events.push(event),
                Err(e) => tracing::warn!("Dropping undecodable event line {:?}: {}", line, e),
            },
        }
    }
}

/// Bare `+OK` sent periodically in receive-loop mode.
fn is_heartbeat(line: &str) -> bool {
    line.trim().as_bytes() == POSITIVE_TOKEN
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use crate::queue::PendingReply;

    fn command(verb: &str, mode: ModeChange) -> (PendingCommand, PendingReply) {
        PendingCommand::new(Command::new(verb, None).unwrap(), mode)
    }

    /// Session in `Connected` with the banner already consumed.
    fn connected() -> Session {
        let mut session = Session::new();
        let (banner, _reply) = PendingCommand::new(Command::banner(), ModeChange::None);
        session.open(banner);
        session.feed(b"+OK - Welcome\r\n");
        assert_eq!(session.pending(), 0);
        session
    }

    fn issue(session: &mut Session, verb: &str, mode: ModeChange) -> PendingReply {
        let (cmd, reply) = command(verb, mode);
        session.check_issue(&cmd).unwrap();
        session.enqueue(cmd);
        reply
    }

    #[tokio::test]
    async fn test_banner_settles_bootstrap() {
        let mut session = Session::new();
        let (banner, reply) = PendingCommand::new(Command::banner(), ModeChange::None);
        session.open(banner);

        session.feed(b"Welcome to the VSCP daemon\r\n+OK\r\n");

        let frame = reply.await.unwrap();
        assert_eq!(frame.lines(), ["Welcome to the VSCP daemon"]);
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_issue_when_disconnected() {
        let session = Session::new();
        let (cmd, _reply) = command("NOOP", ModeChange::None);
        assert!(matches!(
            session.check_issue(&cmd),
            Err(VscpError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_noop_settles_with_empty_payload() {
        let mut session = connected();
        let reply = issue(&mut session, "NOOP", ModeChange::None);

        session.feed(b"+OK\r\n");

        let lines = reply.await.unwrap().into_result().unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_negative_frame_settles_error_path() {
        let mut session = connected();
        let reply = issue(&mut session, "USER", ModeChange::None);

        session.feed(b"5,Bad password\r\n-OK\r\n");

        match reply.await.unwrap().into_result() {
            Err(VscpError::Server(e)) => {
                assert_eq!(e.code, Some(5));
                assert_eq!(e.description, "Bad password");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_pipelined_commands_settle_in_order_under_fragmentation() {
        let mut session = connected();
        let replies: Vec<PendingReply> = (0..5)
            .map(|_| issue(&mut session, "CHKDATA", ModeChange::None))
            .collect();

        let wire: Vec<u8> = (0..5)
            .flat_map(|i| format!("{}\r\n+OK\r\n", i).into_bytes())
            .collect();
        for chunk in wire.chunks(3) {
            session.feed(chunk);
        }

        for (i, reply) in replies.into_iter().enumerate() {
            let frame = reply.await.unwrap();
            assert_eq!(frame.lines(), [i.to_string()]);
        }
        assert_eq!(session.pending(), 0);
    }

    #[test]
    fn test_unsolicited_frame_is_discarded() {
        let mut session = connected();
        let dispatch = session.feed(b"stray\r\n+OK\r\n");
        assert!(dispatch.is_empty());
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_enter_loop_on_success_and_route_events() {
        let mut session = connected();
        let reply = issue(&mut session, "RCVLOOP", ModeChange::EnterLoopOnSuccess);
        assert_eq!(session.state(), ConnectionState::Connected);

        let dispatch = session.feed(b"+OK - Receive loop entered.\r\n0,10,6,0,,0,GUID,1,2,3\r\n");

        assert!(reply.await.unwrap().is_success());
        assert_eq!(session.state(), ConnectionState::RcvLoop);
        assert_eq!(dispatch.events.len(), 1);
        assert_eq!(dispatch.events[0].vscp_class, 10);
        assert_eq!(dispatch.events[0].vscp_type, 6);
        assert_eq!(dispatch.events[0].data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_rcvloop_stays_connected() {
        let mut session = connected();
        let reply = issue(&mut session, "RCVLOOP", ModeChange::EnterLoopOnSuccess);

        session.feed(b"-OK - Not allowed\r\n");

        assert!(!reply.await.unwrap().is_success());
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_heartbeat_and_error_marker_in_loop() {
        let mut session = connected();
        let _reply = issue(&mut session, "RCVLOOP", ModeChange::EnterLoopOnSuccess);
        session.feed(b"+OK\r\n");

        let dispatch = session.feed(b"+OK\r\n-OK - Queue overrun\r\n+OK\r\n");

        assert!(dispatch.events.is_empty());
        assert_eq!(dispatch.loop_errors.len(), 1);
        assert_eq!(dispatch.loop_errors[0].description, "Queue overrun");
        assert_eq!(session.state(), ConnectionState::RcvLoop);
    }

    #[tokio::test]
    async fn test_commands_rejected_inside_loop() {
        let mut session = connected();
        let _reply = issue(&mut session, "RCVLOOP", ModeChange::EnterLoopOnSuccess);
        session.feed(b"+OK\r\n");

        let (noop, _r) = command("NOOP", ModeChange::None);
        assert!(matches!(
            session.check_issue(&noop),
            Err(VscpError::InvalidState(_))
        ));
    }

    /// Session inside the receive loop.
    fn in_loop() -> Session {
        let mut session = connected();
        let _reply = issue(&mut session, "RCVLOOP", ModeChange::EnterLoopOnSuccess);
        session.feed(b"+OK\r\n");
        assert_eq!(session.state(), ConnectionState::RcvLoop);
        session
    }

    #[tokio::test]
    async fn test_quitloop_returns_to_response_mode() {
        let mut session = in_loop();

        let quit = issue(&mut session, "QUITLOOP", ModeChange::LeaveLoop);
        assert_eq!(session.state(), ConnectionState::RcvLoop);

        session.feed(b"+OK - Quit receive loop.\r\n");
        assert!(quit.await.unwrap().is_success());
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_quitloop_keeps_routing_in_flight_events() {
        let mut session = in_loop();
        let quit = issue(&mut session, "QUITLOOP", ModeChange::LeaveLoop);

        let dispatch = session.feed(b"0,10,6,0,,0,-,1\r\n+OK\r\n");

        assert_eq!(dispatch.events.len(), 1);
        assert_eq!(dispatch.events[0].data, vec![1]);
        assert_eq!(session.pending(), 1);
        assert_eq!(session.state(), ConnectionState::RcvLoop);

        session.feed(b"+OK - Quit receive loop.\r\n");
        let frame = quit.await.unwrap();
        assert_eq!(frame.terminator(), "+OK - Quit receive loop.");
        assert!(frame.lines().is_empty());
        assert_eq!(session.state(), ConnectionState::Connected);

        // Correlation stays aligned for the next command.
        let version = issue(&mut session, "VERSION", ModeChange::None);
        session.feed(b"1,2,3,4\r\n+OK\r\n");
        assert_eq!(version.await.unwrap().lines(), ["1,2,3,4"]);
    }

    #[tokio::test]
    async fn test_quitloop_reply_and_response_in_one_chunk() {
        let mut session = in_loop();
        let quit = issue(&mut session, "QUITLOOP", ModeChange::LeaveLoop);

        session.feed(b"+OK\r\n+OK - Quit receive loop.\r\n");
        assert!(quit.await.unwrap().is_success());

        let version = issue(&mut session, "VERSION", ModeChange::None);
        session.feed(b"1,2,3,4\r\n+OK\r\n");
        assert_eq!(version.await.unwrap().lines(), ["1,2,3,4"]);
        assert_eq!(session.pending(), 0);
    }

    #[tokio::test]
    async fn test_refused_quitloop_stays_in_loop() {
        let mut session = in_loop();
        let quit = issue(&mut session, "QUITLOOP", ModeChange::LeaveLoop);

        let dispatch = session.feed(b"-OK - Refused\r\n0,10,6,0,,0,-\r\n");

        assert!(!quit.await.unwrap().is_success());
        assert!(dispatch.loop_errors.is_empty());
        assert_eq!(dispatch.events.len(), 1);
        assert_eq!(session.state(), ConnectionState::RcvLoop);
    }

    #[test]
    fn test_commands_rejected_while_leaving_loop() {
        let mut session = in_loop();
        let _quit = issue(&mut session, "QUITLOOP", ModeChange::LeaveLoop);

        let (again, _r) = command("QUITLOOP", ModeChange::LeaveLoop);
        assert!(matches!(
            session.check_issue(&again),
            Err(VscpError::InvalidState(_))
        ));
    }

    #[test]
    fn test_quitloop_rejected_outside_loop() {
        let session = connected();
        let (cmd, _r) = command("QUITLOOP", ModeChange::LeaveLoop);
        assert!(matches!(
            session.check_issue(&cmd),
            Err(VscpError::InvalidState(_))
        ));
    }

    #[test]
    fn test_established_after_banner() {
        let mut session = Session::new();
        let (banner, _reply) = PendingCommand::new(Command::banner(), ModeChange::None);
        session.open(banner);
        assert!(!session.is_established());

        session.feed(b"Welcome\r\n+OK\r\n");
        assert!(session.is_established());

        session.close();
        assert!(!session.is_established());
    }

    #[test]
    fn test_negative_banner_not_established() {
        let mut session = Session::new();
        let (banner, _reply) = PendingCommand::new(Command::banner(), ModeChange::None);
        session.open(banner);

        session.feed(b"-OK - Too many connections\r\n");
        assert!(!session.is_established());
    }

    #[test]
    fn test_close_expected_only_after_positive_quit() {
        let mut session = connected();
        let _refused = issue(&mut session, "QUIT", ModeChange::CloseOnSuccess);
        session.feed(b"-OK - refused\r\n");
        assert!(!session.close_expected());

        let _accepted = issue(&mut session, "QUIT", ModeChange::CloseOnSuccess);
        session.feed(b"+OK - Connection closed.\r\n");
        assert!(session.close_expected());

        session.close();
        assert!(!session.close_expected());
    }

    #[tokio::test]
    async fn test_close_drains_queue() {
        let mut session = connected();
        let a = issue(&mut session, "NOOP", ModeChange::None);
        let b = issue(&mut session, "VERSION", ModeChange::None);
        session.feed(b"partial");

        let drained = session.close();

        assert_eq!(drained, 2);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.pending(), 0);
        assert!(matches!(a.await, Err(VscpError::ConnectionClosed)));
        assert!(matches!(b.await, Err(VscpError::ConnectionClosed)));

        // Data after close is ignored.
        assert!(session.feed(b"+OK\r\n").is_empty());
    }
}
