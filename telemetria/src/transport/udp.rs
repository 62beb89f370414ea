use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs as _, UdpSocket},
    time::Duration,
};

use tracing::{debug, trace};

use super::{BatchPoints, TimeSeriesWriter, TransportError};

/// Default maximum size of a single datagram, in bytes.
pub const DEFAULT_UDP_PAYLOAD_SIZE: usize = 512;

/// Configuration for a [`UdpWriter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UdpConfig {
    /// Remote address, in the form of `<host>:<port>`.
    pub addr: String,

    /// Maximum size of a single datagram.
    ///
    /// Points are packed into datagrams up to this size. A point that is larger than this by itself is still sent, alone
    /// in its own datagram.
    ///
    /// Defaults to 512 bytes.
    pub payload_size: usize,

    /// Write timeout applied to the socket. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
}

impl UdpConfig {
    /// Creates a new `UdpConfig` targeting the given address with default settings.
    pub fn new<A>(addr: A) -> Self
    where
        A: Into<String>,
    {
        UdpConfig { addr: addr.into(), payload_size: DEFAULT_UDP_PAYLOAD_SIZE, write_timeout: None }
    }

    /// Sets the maximum datagram size.
    #[must_use]
    pub fn with_payload_size(mut self, payload_size: usize) -> Self {
        self.payload_size = payload_size;
        self
    }

    /// Sets the socket write timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }
}

/// Writes points as line-protocol datagrams to a UDP listener.
///
/// The database and retention policy of a batch are ignored: the UDP listener on the receiving side decides where the
/// points are stored.
#[derive(Debug)]
pub struct UdpWriter {
    remote_addr: SocketAddr,
    socket: UdpSocket,
    payload_size: usize,
}

impl UdpWriter {
    /// Creates a new `UdpWriter`.
    ///
    /// The address is resolved once, and a socket bound to an ephemeral local port is connected to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be resolved (for example, when the port is missing) or if the socket
    /// cannot be bound or connected.
    pub fn new(config: UdpConfig) -> Result<Self, TransportError> {
        let addrs = config.addr.to_socket_addrs()?.collect::<Vec<_>>();
        let remote_addr = addrs.first().copied().ok_or_else(|| TransportError::InvalidAddress {
            addr: config.addr.clone(),
            reason: "address did not resolve to any socket address".to_owned(),
        })?;

        let socket = if remote_addr.is_ipv4() {
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?
        } else {
            UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?
        };
        socket.connect(remote_addr)?;
        socket.set_write_timeout(config.write_timeout)?;

        debug!(%remote_addr, payload_size = config.payload_size, "Created UDP writer.");

        Ok(UdpWriter { remote_addr, socket, payload_size: config.payload_size.max(1) })
    }

    /// Returns the resolved remote address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl TimeSeriesWriter for UdpWriter {
    fn write(&self, batch: &BatchPoints) -> Result<(), TransportError> {
        let mut packer = DatagramPacker::new(self.payload_size);
        for point in batch.points() {
            let mut line = Vec::new();
            point.write_line(&mut line, batch.precision());
            line.push(b'\n');
            packer.push_line(&line);
        }

        // Every datagram is attempted even if an earlier one fails; the first failure is reported.
        let mut first_error: Option<io::Error> = None;
        let mut datagrams = 0;
        for datagram in packer.datagrams() {
            datagrams += 1;
            if let Err(e) = self.socket.send(datagram) {
                debug!(error = %e, len = datagram.len(), "Failed to send datagram.");
                first_error.get_or_insert(e);
            }
        }

        trace!(points = batch.points().len(), datagrams, "Sent batch over UDP.");

        match first_error {
            Some(e) => Err(TransportError::Io(e)),
            None => Ok(()),
        }
    }

    fn transport_id(&self) -> &'static str {
        "udp"
    }
}

/// Packs newline-terminated lines into datagrams that do not exceed a maximum size.
///
/// Lines are never split. A line larger than the maximum size is placed alone in its own datagram.
struct DatagramPacker {
    max_len: usize,
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl DatagramPacker {
    fn new(max_len: usize) -> Self {
        DatagramPacker { max_len, buf: Vec::new(), offsets: Vec::new() }
    }

    fn last_offset(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn current_len(&self) -> usize {
        self.buf.len() - self.last_offset()
    }

    fn finalize_current(&mut self) {
        if self.current_len() != 0 {
            self.offsets.push(self.buf.len());
        }
    }

    fn push_line(&mut self, line: &[u8]) {
        if self.current_len() + line.len() > self.max_len {
            self.finalize_current();
        }
        self.buf.extend_from_slice(line);
    }

    fn datagrams(&mut self) -> impl Iterator<Item = &[u8]> + '_ {
        self.finalize_current();

        let buf = &self.buf;
        let mut start = 0;
        self.offsets.iter().map(move |&end| {
            let datagram = &buf[start..end];
            start = end;
            datagram
        })
    }
}
