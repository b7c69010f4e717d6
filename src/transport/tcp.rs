//! Plain TCP transport on `std::net` and `socket2`.
//!
//! Nothing here blocks the caller. Host names are resolved on a short-lived
//! helper thread, the connect is started non-blocking and polled from
//! `dowork`, and once connected all reading and writing happens in `dowork`.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use log::{debug, trace, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use super::{IoOpenResult, IoSendResult, SendId, Transport, TransportEvents};
use crate::error::{Error, Result};
use crate::options::{OptionHandler, OptionTarget, OptionValue};

/// Option name: disable Nagle's algorithm (bool).
pub const OPTION_TCP_NODELAY: &str = "tcp_nodelay";
/// Option name: bytes read from the socket per read call (int).
pub const OPTION_READ_CHUNK_SIZE: &str = "read_chunk_size";

const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

#[derive(Debug)]
struct PendingWrite {
    data: Vec<u8>,
    written: usize,
    id: Option<SendId>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Resolving(Receiver<io::Result<Vec<SocketAddr>>>),
    Connecting {
        socket: Socket,
        addr: SocketAddr,
        remaining: VecDeque<SocketAddr>,
    },
    Connected(TcpStream),
}

/// Non-blocking TCP byte stream.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    phase: Phase,
    outbound: VecDeque<PendingWrite>,
    failed: bool,
    nodelay: bool,
    read_chunk_size: usize,
}

#[cfg(unix)]
fn is_einprogress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS)
}

#[cfg(not(unix))]
fn is_einprogress(_err: &io::Error) -> bool {
    false
}

fn connect_in_progress(err: &io::Error) -> bool {
    is_einprogress(err) || matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Create a non-blocking socket and start connecting it to `addr`.
fn begin_connect(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    match socket.connect(&SockAddr::from(addr)) {
        Ok(()) => Ok(socket),
        Err(e) if connect_in_progress(&e) => Ok(socket),
        Err(e) => Err(e),
    }
}

/// `Ok(true)` once connected, `Ok(false)` while the handshake is in flight.
fn connect_finished(socket: &Socket) -> io::Result<bool> {
    if let Some(err) = socket.take_error()? {
        return Err(err);
    }
    match socket.peer_addr() {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotConnected => Ok(false),
        Err(e) => Err(e),
    }
}

impl TcpTransport {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            phase: Phase::Idle,
            outbound: VecDeque::new(),
            failed: false,
            nodelay: true,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    fn resolve(&self) -> io::Result<Receiver<io::Result<Vec<SocketAddr>>>> {
        let (tx, rx) = mpsc::channel();
        let target = (self.host.clone(), self.port);
        thread::Builder::new()
            .name("uws-resolve".into())
            .spawn(move || {
                let addrs = target.to_socket_addrs().map(Iterator::collect);
                // The transport may have been closed or dropped meanwhile.
                let _ = tx.send(addrs);
            })?;
        Ok(rx)
    }

    /// Try `addrs` in order until one starts connecting.
    fn connect_next(&mut self, mut addrs: VecDeque<SocketAddr>, events: &mut TransportEvents) {
        while let Some(addr) = addrs.pop_front() {
            match begin_connect(addr) {
                Ok(socket) => {
                    trace!("Connecting to {addr}");
                    self.phase = Phase::Connecting {
                        socket,
                        addr,
                        remaining: addrs,
                    };
                    return self.poll_connect(events);
                }
                Err(e) => debug!("Connecting to {addr} failed: {e}"),
            }
        }
        warn!("Could not connect to {}:{}", self.host, self.port);
        self.phase = Phase::Idle;
        events.open_complete(IoOpenResult::Error);
    }

    fn poll_resolve(&mut self, events: &mut TransportEvents) {
        let Phase::Resolving(rx) = &self.phase else {
            return;
        };
        let addrs = match rx.try_recv() {
            Err(TryRecvError::Empty) => return,
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                warn!("Resolving {} failed: {e}", self.host);
                self.phase = Phase::Idle;
                return events.open_complete(IoOpenResult::Error);
            }
            Err(TryRecvError::Disconnected) => {
                warn!("Resolver for {} went away", self.host);
                self.phase = Phase::Idle;
                return events.open_complete(IoOpenResult::Error);
            }
        };
        trace!("Resolved {} to {addrs:?}", self.host);
        self.connect_next(addrs.into(), events);
    }

    fn poll_connect(&mut self, events: &mut TransportEvents) {
        let Phase::Connecting { socket, addr, .. } = &self.phase else {
            return;
        };
        let addr = *addr;
        match connect_finished(socket) {
            Ok(false) => {}
            Ok(true) => {
                let Phase::Connecting { socket, .. } =
                    std::mem::replace(&mut self.phase, Phase::Idle)
                else {
                    return;
                };
                let stream = TcpStream::from(socket);
                if let Err(e) = stream.set_nodelay(self.nodelay) {
                    warn!("Configuring connection to {addr} failed: {e}");
                    return events.open_complete(IoOpenResult::Error);
                }
                debug!("Connected to {}:{} ({addr})", self.host, self.port);
                self.phase = Phase::Connected(stream);
                events.open_complete(IoOpenResult::Ok);
            }
            Err(e) => {
                debug!("Connecting to {addr} failed: {e}");
                let Phase::Connecting { remaining, .. } =
                    std::mem::replace(&mut self.phase, Phase::Idle)
                else {
                    return;
                };
                self.connect_next(remaining, events);
            }
        }
    }

    /// Write as much queued data as the socket takes without blocking.
    fn flush(&mut self, events: &mut TransportEvents) -> io::Result<()> {
        let Phase::Connected(stream) = &mut self.phase else {
            return Ok(());
        };
        while let Some(front) = self.outbound.front_mut() {
            match stream.write(&front.data[front.written..]) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    front.written += n;
                    if front.written == front.data.len() {
                        let id = front.id;
                        self.outbound.pop_front();
                        events.send_complete(id, IoSendResult::Ok);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn read_available(&mut self, events: &mut TransportEvents) -> io::Result<()> {
        let mut chunk = vec![0u8; self.read_chunk_size];
        let Phase::Connected(stream) = &mut self.phase else {
            return Ok(());
        };
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    trace!("Read {n} bytes");
                    events.bytes_received(&chunk[..n]);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn complete_outbound(&mut self, events: &mut TransportEvents, result: IoSendResult) {
        for pending in self.outbound.drain(..) {
            events.send_complete(pending.id, result);
        }
    }

    fn fail(&mut self, events: &mut TransportEvents, reason: &io::Error) {
        warn!("TCP transport to {}:{} failed: {reason}", self.host, self.port);
        self.failed = true;
        self.complete_outbound(events, IoSendResult::Error);
        events.error();
    }
}

impl OptionTarget for TcpTransport {
    fn set_option(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        match name {
            OPTION_TCP_NODELAY => {
                let nodelay = value
                    .as_bool()
                    .ok_or_else(|| Error::InvalidOptionValue(name.to_string()))?;
                if let Phase::Connected(stream) = &self.phase {
                    stream.set_nodelay(nodelay)?;
                }
                self.nodelay = nodelay;
            }
            OPTION_READ_CHUNK_SIZE => {
                self.read_chunk_size = value
                    .as_int()
                    .and_then(|size| usize::try_from(size).ok())
                    .filter(|size| *size > 0)
                    .ok_or_else(|| Error::InvalidOptionValue(name.to_string()))?;
            }
            _ => return Err(Error::UnknownOption(name.to_string())),
        }
        Ok(())
    }
}

impl Transport for TcpTransport {
    /// Start connecting. `OpenComplete` is reported from this call for an
    /// immediate result, otherwise from a later `dowork`.
    fn open(&mut self, events: &mut TransportEvents) -> Result<()> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(Error::Transport("TCP transport already open".into()));
        }
        self.failed = false;
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            let addr = SocketAddr::new(ip, self.port);
            self.connect_next(VecDeque::from([addr]), events);
        } else {
            self.phase = Phase::Resolving(self.resolve()?);
        }
        Ok(())
    }

    fn close(&mut self, events: &mut TransportEvents) -> Result<()> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => return Err(Error::Transport("TCP transport not open".into())),
            Phase::Resolving(_) | Phase::Connecting { .. } => {
                debug!("Abandoning connect to {}:{}", self.host, self.port);
                events.open_complete(IoOpenResult::Cancelled);
            }
            Phase::Connected(stream) => {
                if let Err(e) = stream.shutdown(Shutdown::Both) {
                    trace!("Shutdown of {}:{} reported {e}", self.host, self.port);
                }
                self.complete_outbound(events, IoSendResult::Cancelled);
            }
        }
        events.close_complete();
        Ok(())
    }

    fn send(
        &mut self,
        data: &[u8],
        id: Option<SendId>,
        events: &mut TransportEvents,
    ) -> Result<()> {
        if !matches!(self.phase, Phase::Connected(_)) || self.failed {
            return Err(Error::Transport("TCP transport not open".into()));
        }
        self.outbound.push_back(PendingWrite {
            data: data.to_vec(),
            written: 0,
            id,
        });
        if let Err(e) = self.flush(events) {
            self.fail(events, &e);
        }
        Ok(())
    }

    fn dowork(&mut self, events: &mut TransportEvents) {
        match self.phase {
            Phase::Idle => return,
            Phase::Resolving(_) => return self.poll_resolve(events),
            Phase::Connecting { .. } => return self.poll_connect(events),
            Phase::Connected(_) if self.failed => return,
            Phase::Connected(_) => {}
        }
        let outcome = self.flush(events).and_then(|()| self.read_available(events));
        if let Err(e) = outcome {
            self.fail(events, &e);
        }
    }

    fn retrieve_options(&self) -> Result<OptionHandler> {
        let mut options = OptionHandler::new();
        options.add_option(OPTION_TCP_NODELAY, OptionValue::Bool(self.nodelay))?;
        let chunk = i64::try_from(self.read_chunk_size)
            .map_err(|_| Error::InvalidOptionValue(OPTION_READ_CHUNK_SIZE.to_string()))?;
        options.add_option(OPTION_READ_CHUNK_SIZE, OptionValue::Int(chunk))?;
        Ok(options)
    }
}
