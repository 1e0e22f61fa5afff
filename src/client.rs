//! Client builder and connection runtime.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the
//! connection and registering listeners. The [`Client`] manages the
//! lifecycle:
//! 1. Open the TCP stream (bounded by the connect timeout)
//! 2. Queue an unsent placeholder command for the welcome banner
//! 3. Spawn the writer task and the read loop
//! 4. Feed received bytes to the protocol state machine, settle commands,
//!    broadcast events
//! 5. On end, error or `disconnect`, fail every outstanding command
//!
//! # Example
//!
//! ```ignore
//! use vscp_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .host("localhost")
//!         .on_event(|ev| println!("class={} type={}", ev.vscp_class, ev.vscp_type))
//!         .build();
//!
//!     client.connect().await?;
//!     client.login("admin", "secret").await?;
//!     println!("{:?}", client.get_remote_version().await?);
//!     client.start_rcv_loop().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{Result, VscpError};
use crate::listener::{ErrorListener, EventListener, ListenerId, Listeners, RawMessageListener};
use crate::protocol::{verbs, Command, Event};
use crate::queue::{ModeChange, PendingCommand, PendingReply};
use crate::session::{ConnectionState, Session};
use crate::transport::{self, BoxedReader, TransportStream};
use crate::writer::{spawn_writer_task, OutboundLine, WriterHandle};

/// Builder for configuring and creating a VSCP client.
pub struct ClientBuilder {
    config: ClientConfig,
    listeners: Listeners,
}

impl ClientBuilder {
    /// Create a new client builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            listeners: Listeners::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port.
    ///
    /// Default: 9598
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the connect timeout (TCP connect plus welcome banner).
    ///
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Tear the connection down when nothing is received for `timeout`.
    ///
    /// Default: disabled
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the socket read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Register an event listener (receive-loop events).
    pub fn on_event<F>(mut self, listener: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners.events.add(Arc::new(listener));
        self
    }

    /// Register a raw-message listener.
    pub fn on_raw_message<F>(mut self, listener: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.listeners.raw.add(Arc::new(listener));
        self
    }

    /// Register a connection-error listener.
    pub fn on_connection_error<F>(mut self, listener: F) -> Self
    where
        F: Fn(&VscpError) + Send + Sync + 'static,
    {
        self.listeners.errors.add(Arc::new(listener));
        self
    }

    /// Build the client. It starts out disconnected.
    pub fn build(self) -> Client {
        Client::with_listeners(self.config, self.listeners)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Live socket resources of one connection lifecycle.
struct Link {
    writer: WriterHandle,
    reader_task: JoinHandle<()>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        // The writer task exits by itself once the handle is dropped.
        self.reader_task.abort();
    }
}

/// State guarded by the connection lock.
struct Shared {
    session: Session,
    link: Option<Link>,
    /// Incremented per lifecycle so a stale read loop cannot touch a newer
    /// connection.
    generation: u64,
}

struct Inner {
    config: ClientConfig,
    shared: Mutex<Shared>,
    listeners: Mutex<Listeners>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    /// Route one received chunk. Listeners run after the lock is released.
    fn handle_chunk(&self, generation: u64, data: &[u8]) {
        let raw = lock(&self.listeners).raw.snapshot();
        if raw.iter().any(|listener| listener(data)) {
            tracing::trace!("chunk of {} bytes handled by raw listener", data.len());
            return;
        }

        let dispatch = {
            let mut shared = lock(&self.shared);
            if shared.generation != generation {
                return;
            }
            shared.session.feed(data)
        };
        if dispatch.is_empty() {
            return;
        }

        if !dispatch.events.is_empty() {
            let listeners = lock(&self.listeners).events.snapshot();
            for event in &dispatch.events {
                for listener in &listeners {
                    listener(event);
                }
            }
        }

        for error in dispatch.loop_errors {
            self.notify_error(&VscpError::Server(error));
        }
    }

    /// Move lifecycle `generation` to `Disconnected`.
    ///
    /// Every outstanding command fails with `ConnectionClosed`, the socket
    /// is released and event listeners are cleared. `reason` is reported to
    /// connection-error listeners only when the banner was received and no
    /// close was requested.
    fn teardown(&self, generation: u64, reason: Option<VscpError>) {
        let (link, report) = {
            let mut shared = lock(&self.shared);
            if shared.generation != generation || shared.link.is_none() {
                return;
            }
            // Before the banner, failures go to the caller of `connect`.
            let report = shared.session.is_established() && !shared.session.close_expected();
            shared.session.close();
            (shared.link.take(), report)
        };
        drop(link);

        lock(&self.listeners).events.clear();

        match reason {
            Some(reason) if report => {
                tracing::warn!("connection lost: {}", reason);
                self.notify_error(&reason);
            }
            _ => tracing::debug!("connection closed"),
        }
    }

    fn notify_error(&self, error: &VscpError) {
        let listeners = lock(&self.listeners).errors.snapshot();
        for listener in listeners {
            listener(error);
        }
    }
}

/// A VSCP tcp/ip link client.
///
/// Cheap to clone; clones share one connection. All methods take `&self`,
/// so commands can be issued concurrently from several tasks and are
/// pipelined on the wire in issue order.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a disconnected client with the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_listeners(config, Listeners::new())
    }

    fn with_listeners(config: ClientConfig, listeners: Listeners) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                shared: Mutex::new(Shared {
                    session: Session::new(),
                    link: None,
                    generation: 0,
                }),
                listeners: Mutex::new(listeners),
            }),
        }
    }

    /// Connection configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.shared).session.state()
    }

    /// Check if a connection is established.
    pub fn is_connected(&self) -> bool {
        self.state() != ConnectionState::Disconnected
    }

    /// Number of commands waiting for a reply.
    pub fn pending_commands(&self) -> usize {
        lock(&self.inner.shared).session.pending()
    }

    /// Connect to the configured server and wait for its welcome banner.
    ///
    /// TCP connect and banner together must complete within the connect
    /// timeout. On failure nothing usable is left behind.
    pub async fn connect(&self) -> Result<()> {
        let config = &self.inner.config;
        config.validate()?;
        if self.is_connected() {
            return Err(VscpError::AlreadyConnected);
        }

        let timeout = config.connect_timeout();
        let started = Instant::now();
        let stream = transport::connect(&config.host, config.port, timeout).await?;

        let remaining = timeout.saturating_sub(started.elapsed());
        self.open(stream, remaining).await
    }

    /// Run the protocol over an already connected stream and wait for the
    /// welcome banner (bounded by the connect timeout).
    pub async fn connect_stream<S: TransportStream>(&self, stream: S) -> Result<()> {
        self.open(stream, self.inner.config.connect_timeout()).await
    }

    async fn open<S: TransportStream>(&self, stream: S, banner_timeout: Duration) -> Result<()> {
        let (generation, banner) = self.attach(stream)?;

        match tokio::time::timeout(banner_timeout, banner).await {
            Ok(Ok(frame)) => match frame.into_result() {
                Ok(lines) => {
                    tracing::debug!("connected: {}", lines.first().map_or("", String::as_str));
                    Ok(())
                }
                Err(e) => {
                    self.inner.teardown(generation, None);
                    Err(e)
                }
            },
            Ok(Err(e)) => Err(e),
            Err(_) => {
                self.inner.teardown(generation, None);
                Err(VscpError::ConnectTimeout(banner_timeout))
            }
        }
    }

    /// Start a new lifecycle on `stream`.
    fn attach<S: TransportStream>(&self, stream: S) -> Result<(u64, PendingReply)> {
        let (reader, writer) = transport::split(stream);

        let mut shared = lock(&self.inner.shared);
        if shared.session.state() != ConnectionState::Disconnected {
            return Err(VscpError::AlreadyConnected);
        }

        shared.generation += 1;
        let generation = shared.generation;

        let (banner, reply) = PendingCommand::new(Command::banner(), ModeChange::None);
        shared.session.open(banner);

        let (writer, writer_task) = spawn_writer_task(writer);
        let reader_task = tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            reader,
            generation,
            self.inner.config.read_buffer_size.max(1),
            self.inner.config.idle_timeout(),
        ));

        shared.link = Some(Link {
            writer,
            reader_task,
            _writer_task: writer_task,
        });

        Ok((generation, reply))
    }

    /// Close the connection.
    ///
    /// Sends `QUIT` first when in command mode (waiting at most the connect
    /// timeout for the reply), then releases the socket. Every command
    /// still outstanding fails with [`VscpError::ConnectionClosed`].
    pub async fn disconnect(&self) {
        let (generation, state) = {
            let mut shared = lock(&self.inner.shared);
            shared.session.expect_close();
            (shared.generation, shared.session.state())
        };

        if state == ConnectionState::Connected {
            if let Ok(quit) = Command::new(verbs::QUIT, None)
                .and_then(|cmd| self.issue(cmd, ModeChange::None))
            {
                let _ = tokio::time::timeout(self.inner.config.connect_timeout(), quit).await;
            }
        }

        self.inner.teardown(generation, None);
    }

    /// Queue `command` and hand its bytes to the writer under one lock.
    pub(crate) fn issue(&self, command: Command, mode: ModeChange) -> Result<PendingReply> {
        let (pending, reply) = PendingCommand::new(command, mode);

        let mut shared = lock(&self.inner.shared);
        shared.session.check_issue(&pending)?;
        let link = shared.link.as_ref().ok_or(VscpError::NotConnected)?;
        link.writer.send(OutboundLine::new(pending.command()))?;
        shared.session.enqueue(pending);

        Ok(reply)
    }

    /// Issue `command` and wait for its payload lines.
    pub(crate) async fn execute(&self, command: Command, mode: ModeChange) -> Result<Vec<String>> {
        self.issue(command, mode)?.await?.into_result()
    }

    /// Issue a command now and return the future of its response frame.
    ///
    /// The command is queued and written before this returns, so several
    /// submissions are pipelined in call order.
    pub fn submit(&self, verb: &str, argument: Option<&str>) -> Result<PendingReply> {
        let command = Command::new(verb, argument)?;
        self.issue(command, ModeChange::None)
    }

    /// Send a raw command and wait for its payload lines.
    ///
    /// A `-OK` reply yields [`VscpError::Server`].
    pub async fn send_command(&self, verb: &str, argument: Option<&str>) -> Result<Vec<String>> {
        self.submit(verb, argument)?.await?.into_result()
    }

    /// Callback form of [`send_command`](Self::send_command).
    ///
    /// Exactly one of `on_success` / `on_error` is called exactly once.
    /// Validation failures call `on_error` before returning. Must be called
    /// from within a tokio runtime.
    pub fn send_command_with<S, E>(
        &self,
        verb: &str,
        argument: Option<&str>,
        on_success: S,
        on_error: E,
    ) where
        S: FnOnce(Vec<String>) + Send + 'static,
        E: FnOnce(VscpError) + Send + 'static,
    {
        match self.submit(verb, argument) {
            Ok(reply) => {
                tokio::spawn(async move {
                    match reply.await.and_then(|frame| frame.into_result()) {
                        Ok(lines) => on_success(lines),
                        Err(e) => on_error(e),
                    }
                });
            }
            Err(e) => on_error(e),
        }
    }

    /// Register an event listener. Listeners are cleared when the
    /// connection closes.
    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener: Arc<EventListener> = Arc::new(listener);
        lock(&self.inner.listeners).events.add(listener)
    }

    /// Register a raw-message listener. It sees every received chunk before
    /// the protocol engine; returning `true` consumes the chunk.
    pub fn on_raw_message<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        let listener: Arc<RawMessageListener> = Arc::new(listener);
        lock(&self.inner.listeners).raw.add(listener)
    }

    /// Register a listener for failures after connect (end of stream, I/O
    /// error, idle timeout, receive-loop error markers).
    pub fn on_connection_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&VscpError) + Send + Sync + 'static,
    {
        let listener: Arc<ErrorListener> = Arc::new(listener);
        lock(&self.inner.listeners).errors.add(listener)
    }

    /// Remove a previously registered listener of any kind.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        lock(&self.inner.listeners).remove(id)
    }
}

/// Main read loop - reads chunks and feeds them to the session.
async fn read_loop(
    inner: Weak<Inner>,
    mut reader: BoxedReader,
    generation: u64,
    buffer_size: usize,
    idle_timeout: Option<Duration>,
) {
    let mut buf = vec![0u8; buffer_size];

    let reason = loop {
        let read = match idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => break VscpError::IdleTimeout(idle),
            },
            None => reader.read(&mut buf).await,
        };

        let n = match read {
            Ok(0) => break VscpError::ConnectionClosed,
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                break VscpError::Io(e);
            }
        };

        match inner.upgrade() {
            Some(inner) => inner.handle_chunk(generation, &buf[..n]),
            None => return,
        }
    };

    if let Some(inner) = inner.upgrade() {
        inner.teardown(generation, Some(reason));
    }
}
