//! Rate-limited datagram transport for occupancy telemetry.
//!
//! The socket is connectionless and lossy: there is no acknowledgement and no
//! retransmission across calls. Within one call a partial write is resumed
//! from the first unsent byte until the channel accepts everything or reports
//! an error, at which point the call gives up and the next frame tries again.

use sha2::{Digest, Sha256};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::encoder::{Payload, WireFormat};
use crate::error::SparkError;

/// Decides whether a payload may be sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendPolicy {
    /// At most one successful send per period.
    MinInterval(Duration),
    /// Skip a payload whose serialized bytes match the last successful send.
    SuppressDuplicates,
}

impl Default for SendPolicy {
    fn default() -> Self {
        SendPolicy::MinInterval(Duration::from_secs(2))
    }
}

/// Connectionless send primitive bound to one remote endpoint.
///
/// `send` may accept fewer bytes than offered.
pub trait DatagramChannel: Send {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Anything the processing stage can hand an encoded payload to.
pub trait TelemetrySink: Send {
    /// Returns true only when the payload was fully written.
    fn try_send(&mut self, payload: &Payload) -> bool;
}

/// UDP socket aimed at a resolved remote address.
pub struct UdpChannel {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpChannel {
    pub fn connect(host: &str, port: u16) -> Result<Self, SparkError> {
        let endpoint = format!("{}:{}", host, port);
        let remote = (host, port)
            .to_socket_addrs()
            .and_then(|mut addrs| {
                addrs.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "no addresses returned")
                })
            })
            .map_err(|source| SparkError::AddressResolution {
                endpoint: endpoint.clone(),
                source,
            })?;

        let local: SocketAddr = if remote.is_ipv6() {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(|source| SparkError::SocketCreation {
            endpoint: endpoint.clone(),
            source,
        })?;

        log::info!("telemetry socket created for {}", remote);
        Ok(Self { socket, remote })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl DatagramChannel for UdpChannel {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send_to(buf, self.remote)
    }
}

/// Send counters, reported at the end of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub sent: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Telemetry transport enforcing one [`SendPolicy`].
pub struct ThrottledTransport<C: DatagramChannel = UdpChannel> {
    channel: C,
    policy: SendPolicy,
    format: WireFormat,
    next_transmit: Option<Instant>,
    last_fingerprint: Option<[u8; 32]>,
    stats: TransportStats,
}

impl ThrottledTransport<UdpChannel> {
    /// Resolve `host:port` and open a UDP socket for it.
    pub fn connect(
        host: &str,
        port: u16,
        policy: SendPolicy,
        format: WireFormat,
    ) -> Result<Self, SparkError> {
        Ok(Self::new(UdpChannel::connect(host, port)?, policy, format))
    }
}

impl<C: DatagramChannel> ThrottledTransport<C> {
    pub fn new(channel: C, policy: SendPolicy, format: WireFormat) -> Self {
        Self {
            channel,
            policy,
            format,
            next_transmit: None,
            last_fingerprint: None,
            stats: TransportStats::default(),
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Policy check and send, using `now` as the current instant.
    pub fn try_send_at(&mut self, payload: &Payload, now: Instant) -> bool {
        let wire = match payload.to_wire(self.format) {
            Ok(wire) => wire,
            Err(err) => {
                self.stats.failed += 1;
                log::warn!("telemetry payload not serialized: {}", err);
                return false;
            }
        };
        let fingerprint: [u8; 32] = Sha256::digest(&wire).into();

        let allowed = match self.policy {
            SendPolicy::MinInterval(_) => self.next_transmit.map_or(true, |next| now >= next),
            SendPolicy::SuppressDuplicates => self.last_fingerprint != Some(fingerprint),
        };
        if !allowed {
            self.stats.skipped += 1;
            return false;
        }

        if let Err(err) = self.write_all(&wire) {
            self.stats.failed += 1;
            log::warn!("telemetry send failed: {}", err);
            return false;
        }

        match self.policy {
            SendPolicy::MinInterval(period) => self.next_transmit = Some(now + period),
            SendPolicy::SuppressDuplicates => {
                log::debug!("telemetry fingerprint {}", hex::encode(&fingerprint[..8]));
                self.last_fingerprint = Some(fingerprint);
            }
        }
        self.stats.sent += 1;
        true
    }

    fn write_all(&mut self, wire: &[u8]) -> io::Result<()> {
        let mut total = 0;
        while total < wire.len() {
            match self.channel.send(&wire[total..])? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "channel accepted no bytes",
                    ))
                }
                sent => total += sent,
            }
        }
        Ok(())
    }
}

impl<C: DatagramChannel> TelemetrySink for ThrottledTransport<C> {
    fn try_send(&mut self, payload: &Payload) -> bool {
        self.try_send_at(payload, Instant::now())
    }
}
