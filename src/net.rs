//! TCP relay server and the client transport that talks to it.
//!
//! Messages travel as JSON text, one envelope per line, exactly as they cross
//! the in-process relay.
//!
//! Server architecture: one reader thread per client feeds a central `mpsc`
//! channel. The main loop owns the routing state and is the only writer to
//! client sockets, so a stream is never read and written from the same
//! thread.
//!
//! Client architecture: `connect()` opens the socket and spawns a reader
//! thread that decodes lines into an `mpsc` channel; `poll()` drains it
//! without blocking.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::protocol::{Inbound, Outbound, PeerId};
use crate::relay::RelayState;
use crate::transport::{Transport, TransportError};

/// How long the relay loop waits for an event before rechecking its stop flag.
const RELAY_TICK: Duration = Duration::from_millis(100);

// =============================================================================
// Relay server
// =============================================================================

enum RelayEvent {
    NewConnection(TcpStream),
    LineFrom { id: PeerId, text: String },
    Disconnected(PeerId),
}

/// Handle returned by [`start_relay`].
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.wait();
    }

    /// Block until the relay loop exits.
    pub fn wait(self) {
        if let Some(thread) = self.thread {
            let _ = thread.join();
        }
    }
}

/// Bind `addr` and run the relay on a background thread. Returns the bound
/// address, which matters when port 0 was requested.
pub fn start_relay(addr: impl ToSocketAddrs) -> io::Result<(RelayHandle, SocketAddr)> {
    let listener = TcpListener::bind(addr)?;
    let local = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_loop = keep_running.clone();
    let thread = thread::spawn(move || run_relay(listener, keep_running_loop));
    info!("relay: listening on {local}");
    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        local,
    ))
}

fn run_relay(listener: TcpListener, keep_running: Arc<AtomicBool>) {
    let mut state = RelayState::new(fastrand::Rng::new());
    let mut writers: BTreeMap<PeerId, BufWriter<TcpStream>> = BTreeMap::new();
    let (tx, rx) = mpsc::channel();

    // Non-blocking accept so the listener thread notices the stop flag.
    listener.set_nonblocking(true).ok();
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    if tx_listener.send(RelayEvent::NewConnection(stream)).is_err() {
                        break;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("relay: accept failed: {e}");
                    break;
                }
            }
        }
    });

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(RELAY_TICK) {
            Ok(event) => {
                handle_event(&mut state, &mut writers, event, &tx);
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut state, &mut writers, event, &tx);
                }
                flush(&mut state, &mut writers);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Unblock reader threads still waiting on their sockets.
    for writer in writers.values() {
        writer.get_ref().shutdown(Shutdown::Both).ok();
    }
    info!("relay: stopped");
}

fn handle_event(
    state: &mut RelayState,
    writers: &mut BTreeMap<PeerId, BufWriter<TcpStream>>,
    event: RelayEvent,
    tx: &Sender<RelayEvent>,
) {
    match event {
        RelayEvent::NewConnection(stream) => {
            let reader = match stream.try_clone() {
                Ok(s) => s,
                Err(e) => {
                    warn!("relay: could not clone client stream: {e}");
                    return;
                }
            };
            let id = state.open();
            if let Ok(peer) = stream.peer_addr() {
                info!("relay: {peer} connected as {id}");
            }
            writers.insert(id.clone(), BufWriter::new(stream));
            let tx_reader = tx.clone();
            thread::spawn(move || relay_reader_loop(BufReader::new(reader), id, tx_reader));
        }
        RelayEvent::LineFrom { id, text } => state.route(&id, &text),
        RelayEvent::Disconnected(id) => {
            writers.remove(&id);
            state.close(&id);
        }
    }
}

/// Write every queued message to its socket. A failed write closes that
/// connection, which may queue a new peer list, so repeat until quiet.
fn flush(state: &mut RelayState, writers: &mut BTreeMap<PeerId, BufWriter<TcpStream>>) {
    loop {
        let ids = state.ids_with_mail();
        if ids.is_empty() {
            return;
        }
        for id in ids {
            let lines = state.drain(&id);
            let failed = match writers.get_mut(&id) {
                Some(writer) => write_lines(writer, &lines).is_err(),
                None => false,
            };
            if failed {
                warn!("relay: write to {id} failed, closing");
                writers.remove(&id);
                state.close(&id);
            }
        }
    }
}

fn write_lines(writer: &mut BufWriter<TcpStream>, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

fn relay_reader_loop(reader: BufReader<TcpStream>, id: PeerId, tx: Sender<RelayEvent>) {
    for line in reader.lines() {
        let Ok(text) = line else {
            break;
        };
        if text.trim().is_empty() {
            continue;
        }
        let event = RelayEvent::LineFrom {
            id: id.clone(),
            text,
        };
        if tx.send(event).is_err() {
            return;
        }
    }
    let _ = tx.send(RelayEvent::Disconnected(id));
}

// =============================================================================
// Client transport
// =============================================================================

/// [`Transport`] over a TCP connection to a relay started by [`start_relay`].
pub struct TcpTransport {
    addr: String,
    writer: Option<BufWriter<TcpStream>>,
    inbox: Option<Receiver<Inbound>>,
    /// Cleared by the reader thread when the relay hangs up.
    alive: Arc<AtomicBool>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            writer: None,
            inbox: None,
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn hang_up(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.get_ref().shutdown(Shutdown::Both).ok();
        }
        self.inbox = None;
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Err(TransportError::AlreadyConnected);
        }
        self.hang_up();

        let stream = TcpStream::connect(&self.addr)?;
        let reader = stream.try_clone()?;
        let alive = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();
        let alive_reader = alive.clone();
        thread::spawn(move || client_reader_loop(BufReader::new(reader), tx, alive_reader));

        info!("connected to relay at {}", self.addr);
        self.writer = Some(BufWriter::new(stream));
        self.inbox = Some(rx);
        self.alive = alive;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some() && self.alive.load(Ordering::SeqCst)
    }

    fn send(&mut self, message: Outbound) -> Result<(), TransportError> {
        let alive = self.alive.load(Ordering::SeqCst);
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        if !alive {
            return Err(TransportError::Closed);
        }
        let text = message.encode()?;
        writer.write_all(text.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn poll(&mut self) -> Vec<Inbound> {
        match &self.inbox {
            Some(inbox) => inbox.try_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.hang_up();
    }
}

fn client_reader_loop(reader: BufReader<TcpStream>, tx: Sender<Inbound>, alive: Arc<AtomicBool>) {
    for line in reader.lines() {
        let Ok(text) = line else {
            break;
        };
        if text.trim().is_empty() {
            continue;
        }
        match Inbound::decode(&text) {
            Ok(inbound) => {
                if tx.send(inbound).is_err() {
                    break;
                }
            }
            Err(e) => warn!("dropping undecodable message: {e}"),
        }
    }
    alive.store(false, Ordering::SeqCst);
    debug!("relay connection closed");
}
