//! UDP transports (unicast and multicast).
//!
//! The send socket optionally schedules datagrams with `SO_TXTIME`
//! (Linux only). The receive socket is non-blocking and joins the
//! multicast group when the configured address is a multicast address.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use pubsub_common::clock::Deadline;
use pubsub_common::pubsub::config::{PublisherConfig, SubscriberConfig, TxTimeConfig};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::error::{TransportError, TransportResult};
use crate::{ReceiveTransport, SendTransport};

fn new_socket(addr: SocketAddr) -> TransportResult<Socket> {
    Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|source| TransportError::Socket { addr, source })
}

fn unspecified(addr: SocketAddr, port: u16) -> SocketAddr {
    match addr {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
    }
}

#[derive(Debug, Clone, Copy)]
struct TxSchedule {
    lead_ns: u64,
    offset_ns: i64,
}

impl TxSchedule {
    /// Launch time on the socket clock for a monotonic deadline.
    fn launch_ns(&self, deadline: Deadline) -> u64 {
        let ns = deadline.as_nanos().saturating_add(self.lead_ns);
        ns.checked_add_signed(self.offset_ns).unwrap_or(ns)
    }
}

/// Send socket of one publisher connection.
#[derive(Debug)]
pub struct UdpSender {
    socket: UdpSocket,
    dest: SocketAddr,
    schedule: Option<TxSchedule>,
}

impl UdpSender {
    /// Open a send socket towards `dest`.
    ///
    /// `interface` selects the outgoing interface for IPv4 multicast.
    /// `tx_time` enables transmit-time scheduling.
    pub fn new(
        dest: SocketAddr,
        interface: Option<Ipv4Addr>,
        tx_time: Option<&TxTimeConfig>,
    ) -> TransportResult<Self> {
        let socket = new_socket(dest)?;
        if let (IpAddr::V4(group), Some(iface)) = (dest.ip(), interface)
            && group.is_multicast()
        {
            socket
                .set_multicast_if_v4(&iface)
                .map_err(|source| TransportError::Socket { addr: dest, source })?;
        }
        let local = unspecified(dest, 0);
        socket
            .bind(&local.into())
            .map_err(|source| TransportError::Bind { addr: local, source })?;
        let socket: UdpSocket = socket.into();

        let schedule = match tx_time {
            Some(cfg) => Some(enable_tx_time(&socket, cfg)?),
            None => None,
        };

        info!(
            destination = %dest,
            tx_time = schedule.is_some(),
            "UDP send socket ready"
        );
        Ok(Self {
            socket,
            dest,
            schedule,
        })
    }

    /// Open the send socket described by a publisher connection.
    pub fn from_config(cfg: &PublisherConfig) -> TransportResult<Self> {
        Self::new(cfg.address, cfg.interface, cfg.tx_time.as_ref())
    }

    /// Destination address.
    pub fn destination(&self) -> SocketAddr {
        self.dest
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// True when datagrams carry a launch time.
    pub fn tx_time_enabled(&self) -> bool {
        self.schedule.is_some()
    }
}

#[cfg(target_os = "linux")]
fn enable_tx_time(socket: &UdpSocket, cfg: &TxTimeConfig) -> TransportResult<TxSchedule> {
    crate::txtime::enable(socket, cfg.clock).map_err(TransportError::TxTime)?;
    let offset_ns = crate::txtime::clock_offset_ns(cfg.clock).map_err(TransportError::TxTime)?;
    debug!(clock = ?cfg.clock, lead_us = cfg.lead_us, offset_ns, "SO_TXTIME enabled");
    Ok(TxSchedule {
        lead_ns: cfg.lead_us.saturating_mul(1000),
        offset_ns,
    })
}

#[cfg(not(target_os = "linux"))]
fn enable_tx_time(_socket: &UdpSocket, _cfg: &TxTimeConfig) -> TransportResult<TxSchedule> {
    Err(TransportError::Unsupported("SO_TXTIME"))
}

impl SendTransport for UdpSender {
    fn send(&mut self, payload: &[u8], tx_time: Option<Deadline>) -> TransportResult<usize> {
        let sent = match (self.schedule, tx_time) {
            #[cfg(target_os = "linux")]
            (Some(schedule), Some(deadline)) => {
                crate::txtime::send_at(&self.socket, payload, self.dest, schedule.launch_ns(deadline))
            }
            _ => self.socket.send_to(payload, self.dest),
        };
        sent.map_err(|source| TransportError::Send {
            addr: self.dest,
            source,
        })
    }
}

/// Non-blocking receive socket of one subscriber connection.
#[derive(Debug)]
pub struct UdpReceiver {
    socket: UdpSocket,
    addr: SocketAddr,
}

impl UdpReceiver {
    /// Bind to `addr`, joining the group when it is a multicast address.
    ///
    /// `interface` selects the interface for the IPv4 multicast join
    /// (any interface when `None`).
    pub fn bind(addr: SocketAddr, interface: Option<Ipv4Addr>) -> TransportResult<Self> {
        let socket = new_socket(addr)?;
        socket
            .set_reuse_address(true)
            .map_err(|source| TransportError::Socket { addr, source })?;

        let multicast = addr.ip().is_multicast();
        let bind_addr = if multicast {
            unspecified(addr, addr.port())
        } else {
            addr
        };
        socket
            .bind(&bind_addr.into())
            .map_err(|source| TransportError::Bind {
                addr: bind_addr,
                source,
            })?;

        if multicast {
            let joined = match addr.ip() {
                IpAddr::V4(group) => socket
                    .join_multicast_v4(&group, &interface.unwrap_or(Ipv4Addr::UNSPECIFIED)),
                IpAddr::V6(group) => socket.join_multicast_v6(&group, 0),
            };
            joined.map_err(|source| TransportError::MulticastJoin {
                group: addr,
                source,
            })?;
            debug!(group = %addr, interface = ?interface, "joined multicast group");
        }

        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::Socket { addr, source })?;

        info!(address = %addr, multicast, "UDP receive socket ready");
        Ok(Self {
            socket: socket.into(),
            addr,
        })
    }

    /// Open the receive socket described by a subscriber connection.
    pub fn from_config(cfg: &SubscriberConfig) -> TransportResult<Self> {
        Self::bind(cfg.address, cfg.interface)
    }

    /// Configured address.
    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl ReceiveTransport for UdpReceiver {
    fn try_receive(&mut self, buf: &mut [u8]) -> TransportResult<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(e) => Err(TransportError::Receive(e)),
        }
    }
}
