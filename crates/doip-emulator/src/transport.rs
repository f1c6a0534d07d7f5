//! Transport Runtime: owns the TCP listener, the UDP socket, and every
//! per-connection handler task.
//!
//! `DoipServer::start`/`stop` is the only lifecycle surface this module
//! exposes. Cancellation is blunt and immediate rather than cooperative:
//! `stop()` aborts the accept loop, the UDP loop, the announcement loop and
//! every registered session task via `JoinHandle::abort`, which also drops
//! (and so closes) whatever socket each task owned. This mirrors how the
//! embedding application's adapter layer tears down its receiver task on
//! reconnect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use doip_core::codec::{self, PayloadType};
use doip_core::error::DoipError;
use doip_core::events::{Category, EventRecord, EventSink, Severity};
use doip_core::identity::{ServerIdentity, VehicleIdentity};
use doip_core::protocol;
use doip_core::{ConfigError, ResponseCatalog};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EmulatorConfig;
use crate::session::ClientSession;

/// Tracks every live client handler task so `stop()` can abort them all.
struct Registry {
    sessions: Mutex<HashMap<SocketAddr, JoinHandle<()>>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, peer: SocketAddr, handle: JoinHandle<()>) {
        self.sessions.lock().insert(peer, handle);
    }

    fn remove(&self, peer: &SocketAddr) {
        self.sessions.lock().remove(peer);
    }

    fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    fn abort_all(&self) -> Vec<JoinHandle<()>> {
        let mut sessions = self.sessions.lock();
        let handles: Vec<_> = sessions.drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            handle.abort();
        }
        handles
    }
}

/// State shared between `DoipServer` and every task it spawns.
struct Shared {
    identity: ServerIdentity,
    vehicle: VehicleIdentity,
    catalog: ResponseCatalog,
    sink: EventSink,
    running: AtomicBool,
    registry: Registry,
    max_payload: u32,
    port: u16,
    announce_on_start: bool,
}

impl Shared {
    fn log(&self, severity: Severity, category: Category, message: impl Into<String>, peer: Option<SocketAddr>) {
        let message = message.into();
        match severity {
            Severity::Info => info!(category = ?category, peer = ?peer, "{message}"),
            Severity::Warn => warn!(category = ?category, peer = ?peer, "{message}"),
            Severity::Error => error!(category = ?category, peer = ?peer, "{message}"),
        }
        let mut record = EventRecord::new(severity, category, message);
        if let Some(peer) = peer {
            record = record.with_peer(peer);
        }
        self.sink.emit(record);
    }
}

/// A running (or stopped) DoIP server instance bound to one configuration.
///
/// Cheap to construct, expensive to `start()`. `start()`/`stop()` are
/// idempotent: calling either while already in that state logs and returns.
pub struct DoipServer {
    shared: Arc<Shared>,
    host: String,
    tcp_task: Mutex<Option<JoinHandle<()>>>,
    udp_task: Mutex<Option<JoinHandle<()>>>,
    announce_task: Mutex<Option<JoinHandle<()>>>,
}

impl DoipServer {
    /// Build a server from configuration. Loads the response catalog (if
    /// configured) and validates the vehicle identity fields, but opens no
    /// sockets yet.
    pub fn new(config: &EmulatorConfig) -> Result<Self, ConfigError> {
        let identity = config.server_identity();
        let vehicle = config.vehicle_identity()?;
        let catalog = match &config.response_file {
            Some(path) => ResponseCatalog::load(path),
            None => ResponseCatalog::empty(),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                identity,
                vehicle,
                catalog,
                sink: EventSink::new(),
                running: AtomicBool::new(false),
                registry: Registry::new(),
                max_payload: config.max_payload,
                port: config.port,
                announce_on_start: config.announce_on_start,
            }),
            host: config.host.clone(),
            tcp_task: Mutex::new(None),
            udp_task: Mutex::new(None),
            announce_task: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn catalog_size(&self) -> usize {
        self.shared.catalog.size()
    }

    /// Subscribe to the server's event stream. Can be called before or after
    /// `start()`.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.shared.sink.subscribe()
    }

    /// Bind the TCP listener and UDP socket and spawn the runtime tasks.
    ///
    /// A second `start()` call while already running is a no-op.
    pub async fn start(&self) -> Result<(), DoipError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            self.shared
                .log(Severity::Warn, Category::Lifecycle, "start() called while already running", None);
            return Ok(());
        }

        let addr: SocketAddr = format!("{}:{}", self.host, self.shared.port)
            .parse()
            .map_err(|e| DoipError::BindFailure {
                addr: format!("{}:{}", self.host, self.shared.port),
                source: format!("{e}"),
            })?;

        let tcp_listener = match bind_tcp(addr).and_then(TcpListener::from_std) {
            Ok(listener) => listener,
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(DoipError::BindFailure {
                    addr: addr.to_string(),
                    source: e.to_string(),
                });
            }
        };

        let udp_socket = match bind_udp(addr).and_then(UdpSocket::from_std) {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(DoipError::BindFailure {
                    addr: addr.to_string(),
                    source: e.to_string(),
                });
            }
        };

        self.shared
            .log(Severity::Info, Category::Lifecycle, format!("DoIP server listening on {addr} (tcp+udp)"), None);
        self.shared.log(
            Severity::Info,
            Category::Lifecycle,
            format!(
                "physical address 0x{:04X}, functional address 0x{:04X}",
                self.shared.identity.server_addr, self.shared.identity.server_addr_func
            ),
            None,
        );

        *self.tcp_task.lock() = Some(tokio::spawn(accept_loop(tcp_listener, self.shared.clone())));
        *self.udp_task.lock() = Some(tokio::spawn(udp_loop(udp_socket.clone(), self.shared.clone())));

        if self.shared.announce_on_start {
            let port = self.shared.port;
            *self.announce_task.lock() = Some(tokio::spawn(announce_loop(udp_socket, self.shared.clone(), port)));
        }

        Ok(())
    }

    /// Abort every runtime task — accept loop, UDP loop, announcement loop,
    /// and every client session — and wait briefly for them to unwind.
    ///
    /// A second `stop()` call while already stopped is a no-op.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            self.shared
                .log(Severity::Info, Category::Lifecycle, "stop() called while already stopped", None);
            return;
        }

        self.shared.log(Severity::Info, Category::Lifecycle, "stopping DoIP server", None);

        for task in [
            self.tcp_task.lock().take(),
            self.udp_task.lock().take(),
            self.announce_task.lock().take(),
        ] {
            if let Some(handle) = task {
                handle.abort();
                let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
            }
        }

        for handle in self.shared.registry.abort_all() {
            let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
        }

        self.shared.log(Severity::Info, Category::Lifecycle, "DoIP server stopped", None);
    }
}

fn bind_tcp(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(5)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn bind_udp(addr: SocketAddr) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                shared.log(Severity::Info, Category::Transport, "client connected", Some(peer));
                let task_shared = shared.clone();
                let (registered_tx, registered_rx) = tokio::sync::oneshot::channel();
                let handle = tokio::spawn(async move {
                    // Wait until the accept loop has recorded this task's handle in the
                    // registry, so `remove` below can never race ahead of `insert`.
                    let _ = registered_rx.await;
                    handle_client(stream, peer, task_shared.clone()).await;
                    task_shared.registry.remove(&peer);
                    task_shared.log(Severity::Info, Category::Transport, "client disconnected", Some(peer));
                });
                shared.registry.insert(peer, handle);
                let _ = registered_tx.send(());
            }
            Err(e) => {
                shared.log(Severity::Warn, Category::Transport, format!("tcp accept error: {e}"), None);
            }
        }
    }
}

async fn handle_client(mut stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    let mut session = ClientSession::new(peer);

    loop {
        let header_bytes = match codec::read_exact(&mut stream, codec::HEADER_SIZE).await {
            Ok(bytes) => bytes,
            Err(_) => break,
        };
        let header: [u8; codec::HEADER_SIZE] = header_bytes.try_into().expect("read_exact returns exactly n bytes");

        let decoded = match codec::decode_header(&header) {
            Ok(decoded) => decoded,
            Err(e) => {
                shared.log(Severity::Warn, Category::Protocol, format!("{e}, closing connection"), Some(peer));
                break;
            }
        };

        if decoded.payload_length > shared.max_payload {
            let err = DoipError::OversizedPayload {
                declared: decoded.payload_length,
                limit: shared.max_payload,
            };
            shared.log(Severity::Warn, Category::Protocol, format!("{err}, closing connection"), Some(peer));
            break;
        }

        let payload = match codec::read_exact(&mut stream, decoded.payload_length as usize).await {
            Ok(payload) => payload,
            Err(_) => break,
        };

        if !dispatch(&mut stream, &mut session, decoded.payload_type, &payload, &shared).await {
            break;
        }
    }

    session.close();
}

/// Handle one fully-framed message. Returns `false` when the connection must
/// be closed (write failure); `true` to keep reading.
async fn dispatch(
    stream: &mut TcpStream,
    session: &mut ClientSession,
    payload_type: PayloadType,
    payload: &[u8],
    shared: &Shared,
) -> bool {
    match payload_type {
        PayloadType::VehicleIdentificationRequest => {
            let response = protocol::vehicle_identification_response(&shared.vehicle, &shared.identity);
            write_frame(stream, PayloadType::VehicleIdentificationResponse, &response, shared, session.peer).await
        }

        PayloadType::RoutingActivationRequest => match protocol::handle_routing_activation_request(payload, &shared.identity) {
            Ok(activation) => {
                let ok = write_frame(
                    stream,
                    PayloadType::RoutingActivationResponse,
                    &activation.response_payload,
                    shared,
                    session.peer,
                )
                .await;
                if ok {
                    session.activate_routing();
                }
                ok
            }
            Err(e) => {
                shared.log(Severity::Warn, Category::Protocol, format!("{e}"), Some(session.peer));
                true
            }
        },

        PayloadType::DiagnosticMessage => match protocol::handle_diagnostic_message(payload, &shared.identity, &shared.catalog) {
            Some(outcome) => {
                if !write_frame(stream, PayloadType::DiagnosticMessageAck, &outcome.ack_payload, shared, session.peer).await {
                    return false;
                }
                if let Some(uds_response) = outcome.response_payload {
                    let envelope = protocol::diagnostic_response_payload(&shared.identity, outcome.source_addr, &uds_response);
                    if !write_frame(stream, PayloadType::DiagnosticMessage, &envelope, shared, session.peer).await {
                        return false;
                    }
                }
                true
            }
            None => {
                shared.log(Severity::Warn, Category::Protocol, "diagnostic message payload too short, ignoring", Some(session.peer));
                true
            }
        },

        other => {
            let code: u16 = other.into();
            shared.log(Severity::Info, Category::Protocol, format!("{}", DoipError::UnknownPayloadType(code)), Some(session.peer));
            true
        }
    }
}

async fn write_frame(stream: &mut TcpStream, payload_type: PayloadType, payload: &[u8], shared: &Shared, peer: SocketAddr) -> bool {
    let frame = codec::encode(payload_type, payload);
    match stream.write_all(&frame).await {
        Ok(()) => true,
        Err(e) => {
            shared.log(
                Severity::Warn,
                Category::Transport,
                format!("{}, closing connection", DoipError::WriteFailure(e.to_string())),
                Some(peer),
            );
            false
        }
    }
}

async fn udp_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>) {
    let mut buf = [0u8; 4096];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(got) => got,
            Err(e) => {
                shared.log(Severity::Warn, Category::Transport, format!("udp recv error: {e}"), None);
                continue;
            }
        };

        if len < codec::HEADER_SIZE {
            shared.log(Severity::Warn, Category::Transport, format!("short UDP datagram ({len} bytes)"), Some(peer));
            continue;
        }

        let header: [u8; codec::HEADER_SIZE] = buf[..codec::HEADER_SIZE].try_into().expect("checked length above");
        let decoded = match codec::decode_header(&header) {
            Ok(decoded) => decoded,
            Err(e) => {
                shared.log(Severity::Warn, Category::Protocol, format!("{e}"), Some(peer));
                continue;
            }
        };

        let payload_end = codec::HEADER_SIZE + decoded.payload_length as usize;
        if payload_end > len {
            shared.log(Severity::Warn, Category::Transport, "UDP datagram shorter than declared payload length", Some(peer));
            continue;
        }

        match decoded.payload_type {
            PayloadType::VehicleIdentificationRequest => {
                let response = protocol::vehicle_identification_response(&shared.vehicle, &shared.identity);
                let frame = codec::encode(PayloadType::VehicleIdentificationResponse, &response);
                if let Err(e) = socket.send_to(&frame, peer).await {
                    shared.log(Severity::Warn, Category::Transport, format!("{}", DoipError::WriteFailure(e.to_string())), Some(peer));
                }
            }
            other => {
                let code: u16 = other.into();
                shared.log(Severity::Info, Category::Protocol, format!("{}", DoipError::UnknownPayloadType(code)), Some(peer));
            }
        }
    }
}

/// Broadcast three Vehicle Announcement Messages at one-second intervals,
/// then exit. Runs once per `start()` call.
async fn announce_loop(socket: Arc<UdpSocket>, shared: Arc<Shared>, port: u16) {
    let broadcast_addr: SocketAddr = match format!("255.255.255.255:{port}").parse() {
        Ok(addr) => addr,
        Err(_) => return,
    };

    let payload = protocol::vehicle_announcement(&shared.vehicle, &shared.identity);
    let frame = codec::encode(PayloadType::VehicleIdentificationResponse, &payload);

    for attempt in 1..=3 {
        match socket.send_to(&frame, broadcast_addr).await {
            Ok(_) => shared.log(Severity::Info, Category::Lifecycle, format!("vehicle announcement {attempt}/3 sent"), None),
            Err(e) => shared.log(Severity::Warn, Category::Lifecycle, format!("vehicle announcement {attempt}/3 failed: {e}"), None),
        }
        if attempt < 3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}
