//! # Network Module
//!
//! Networking abstractions over ZMQ. Telemetry leaves the software on PUB sockets, either bound
//! directly for subscribers to connect to, or connected to a forwarding broker.
//!
//! A [`MonitoredSocket`] wraps a zmq socket with a background thread which watches the socket's
//! monitor events, so that the owner can ask whether a peer is currently connected.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace, warn};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use zmq::{Context, Socket, SocketEvent, SocketType};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Used to give each monitor a unique inproc endpoint.
static NUM_MONITORS: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout of the monitor socket. Bounds how long the monitor thread takes to notice a
/// shutdown request.
const MONITOR_POLL_TIMEOUT_MS: i32 = 100;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A zmq socket whose connection state is tracked by a monitor thread.
pub struct MonitoredSocket {
    socket: Socket,

    monitor: Option<MonitorThread>,

    connected: Arc<AtomicBool>,
}

/// Options applied to a [`MonitoredSocket`] before it connects or binds.
///
/// The zmq options follow the
/// [`zmq_setsockopt`](http://api.zeromq.org/4-2:zmq-setsockopt) documentation, all times are in
/// milliseconds.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Bind to the endpoint rather than connect to it.
    pub bind: bool,

    /// Wait in [`MonitoredSocket::new`] until the socket has connected, failing once
    /// `connect_timeout` has elapsed. Ignored when binding.
    pub block_on_first_connect: bool,

    /// `ZMQ_CONNECT_TIMEOUT`, 0 waits indefinitely
    pub connect_timeout: i32,

    /// `ZMQ_HEARTBEAT_IVL`
    pub heartbeat_ivl: i32,

    /// `ZMQ_HEARTBEAT_TIMEOUT`
    pub heartbeat_timeout: i32,

    /// `ZMQ_HEARTBEAT_TTL`
    pub heartbeat_ttl: i32,

    /// `ZMQ_LINGER`
    pub linger: i32,

    /// `ZMQ_SNDTIMEO`, -1 blocks
    pub send_timeout: i32,

    /// `ZMQ_IDENTITY`, used as the client identifier by brokers
    pub identity: Option<String>,
}

struct MonitorThread {
    endpoint: String,

    shutdown: Arc<AtomicBool>,

    handle: thread::JoinHandle<()>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error enabling monitoring for the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not connect or bind to {0}: {1}")]
    CouldNotConnect(String, zmq::Error),

    #[error("Timed out waiting for a connection to {0}")]
    ConnectTimeout(String),

    #[error("Could not read event from monitor socket: {0}")]
    EventReadError(zmq::Error),

    #[error("Malformed monitor event")]
    MalformedEvent,

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(&'static str, zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonitoredSocket {
    /// Create a socket of the given type, apply the options and connect or bind it to `endpoint`.
    pub fn new(
        ctx: &Context,
        socket_type: SocketType,
        options: SocketOptions,
        endpoint: &str,
    ) -> Result<Self, MonitoredSocketError> {
        let socket = ctx
            .socket(socket_type)
            .map_err(MonitoredSocketError::CreateSocketError)?;

        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            NUM_MONITORS.fetch_add(1, Ordering::Relaxed)
        );
        socket
            .monitor(&monitor_endpoint, SocketEvent::ALL as i32)
            .map_err(MonitoredSocketError::MonitoringEnableError)?;

        let monitor = ctx
            .socket(zmq::PAIR)
            .map_err(MonitoredSocketError::CreateSocketError)?;
        monitor
            .connect(&monitor_endpoint)
            .map_err(|e| MonitoredSocketError::CouldNotConnect(monitor_endpoint.clone(), e))?;
        monitor
            .set_rcvtimeo(MONITOR_POLL_TIMEOUT_MS)
            .map_err(|e| MonitoredSocketError::SocketOptionError("rcvtimeo", e))?;

        options.apply(&socket)?;

        if options.bind {
            socket.bind(endpoint)
        } else {
            socket.connect(endpoint)
        }
        .map_err(|e| MonitoredSocketError::CouldNotConnect(endpoint.to_string(), e))?;

        let connected = Arc::new(AtomicBool::new(false));

        if options.block_on_first_connect && !options.bind {
            wait_for_connection(&monitor, endpoint, options.connect_timeout)?;
            connected.store(true, Ordering::Relaxed);
            debug!("Connected to {}", endpoint);
        }

        let monitor = MonitorThread::spawn(monitor, monitor_endpoint, connected.clone());

        Ok(Self {
            socket,
            monitor: Some(monitor),
            connected,
        })
    }

    /// True if a peer is currently connected to the socket.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Self::Target {
        &self.socket
    }
}

impl std::ops::DerefMut for MonitoredSocket {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.socket
    }
}

impl MonitorThread {
    fn spawn(monitor: Socket, endpoint: String, connected: Arc<AtomicBool>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = shutdown.clone();
        let thread_endpoint = endpoint.clone();
        let handle = thread::spawn(move || {
            watch_events(monitor, &thread_endpoint, &thread_shutdown, &connected)
        });

        Self {
            endpoint,
            shutdown,
            handle,
        }
    }

    fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);

        debug!("Waiting for monitor {} to exit", self.endpoint);
        if self.handle.join().is_err() {
            warn!("Monitor {} panicked", self.endpoint);
        }
    }
}

impl SocketOptions {
    /// Set these options on the given socket.
    pub fn apply(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {
        let err = |name: &'static str| {
            move |e: zmq::Error| MonitoredSocketError::SocketOptionError(name, e)
        };

        socket
            .set_connect_timeout(self.connect_timeout)
            .map_err(err("connect_timeout"))?;
        socket
            .set_heartbeat_ivl(self.heartbeat_ivl)
            .map_err(err("heartbeat_ivl"))?;
        socket
            .set_heartbeat_timeout(self.heartbeat_timeout)
            .map_err(err("heartbeat_timeout"))?;
        socket
            .set_heartbeat_ttl(self.heartbeat_ttl)
            .map_err(err("heartbeat_ttl"))?;
        socket.set_linger(self.linger).map_err(err("linger"))?;
        socket
            .set_sndtimeo(self.send_timeout)
            .map_err(err("sndtimeo"))?;

        if let Some(ref id) = self.identity {
            socket
                .set_identity(id.as_bytes())
                .map_err(err("identity"))?;
        }

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        // zmq's own defaults, except block_on_first_connect
        Self {
            bind: false,
            block_on_first_connect: true,
            connect_timeout: 0,
            heartbeat_ivl: 0,
            heartbeat_timeout: 0,
            heartbeat_ttl: 0,
            linger: 30_000,
            send_timeout: -1,
            identity: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build a TCP endpoint string from a host and port.
///
/// A host of `*` is passed through unchanged, which zmq interprets as all interfaces when binding.
pub fn tcp_endpoint(host: &str, port: u16) -> String {
    format!("tcp://{}:{}", host, port)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read one event from a monitor socket. Each event is a two frame message: a 6 byte event
/// (u16 id, u32 value) and the peer address.
fn read_event(monitor: &Socket) -> Result<SocketEvent, MonitoredSocketError> {
    let frames = monitor
        .recv_multipart(0)
        .map_err(MonitoredSocketError::EventReadError)?;

    match frames.first() {
        Some(event) if frames.len() == 2 && event.len() >= 2 => Ok(SocketEvent::from_raw(
            u16::from_ne_bytes([event[0], event[1]]),
        )),
        _ => Err(MonitoredSocketError::MalformedEvent),
    }
}

fn wait_for_connection(
    monitor: &Socket,
    endpoint: &str,
    connect_timeout_ms: i32,
) -> Result<(), MonitoredSocketError> {
    let deadline = if connect_timeout_ms > 0 {
        Some(Instant::now() + Duration::from_millis(connect_timeout_ms as u64))
    } else {
        None
    };

    loop {
        if deadline.map_or(false, |d| Instant::now() >= d) {
            return Err(MonitoredSocketError::ConnectTimeout(endpoint.to_string()));
        }

        match read_event(monitor) {
            Ok(SocketEvent::CONNECTED) => return Ok(()),
            Ok(e) => trace!("Waiting for {}, monitor event {}", endpoint, e.to_raw()),
            Err(MonitoredSocketError::EventReadError(zmq::Error::EAGAIN)) => (),
            Err(e) => return Err(e),
        }
    }
}

fn watch_events(monitor: Socket, endpoint: &str, shutdown: &AtomicBool, connected: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        match read_event(&monitor) {
            Ok(SocketEvent::CONNECTED) => connected.store(true, Ordering::Relaxed),
            Ok(SocketEvent::DISCONNECTED) => connected.store(false, Ordering::Relaxed),
            Ok(_) => (),
            Err(MonitoredSocketError::EventReadError(zmq::Error::EAGAIN)) => (),
            Err(e) => {
                warn!("Monitor {} stopped: {}", endpoint, e);
                break;
            }
        }
    }
}
