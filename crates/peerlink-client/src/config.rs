//! Client configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port the relay listens on in a default deployment.
pub const DEFAULT_RELAY_PORT: u16 = 8000;

/// Settings for a [`ClientSessionManager`](crate::ClientSessionManager).
///
/// Start from `ClientConfig::default()` (or [`with_relay`](Self::with_relay))
/// and override just the fields you need.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where the relay listens.
    pub relay_addr: SocketAddr,

    /// Host used to reach peers. The relay only advertises ports, so
    /// every peer is assumed to be reachable on this address.
    pub peer_host: IpAddr,

    /// Local address the peer acceptor binds to. The port is always
    /// chosen by the OS.
    pub listen_ip: IpAddr,

    /// How often a KEEP_ALIVE is sent while online.
    ///
    /// Default: 10 seconds, a third of the relay's 30-second TTL.
    pub keep_alive_interval: Duration,

    /// Deadline for opening any outbound connection.
    pub connect_timeout: Duration,

    /// How long an inbound peer has to send its handshake.
    pub handshake_timeout: Duration,

    /// Buffer size used when streaming file contents.
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_RELAY_PORT),
            peer_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            keep_alive_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            chunk_size: 4096,
        }
    }
}

impl ClientConfig {
    /// Default settings pointed at a specific relay.
    pub fn with_relay(relay_addr: SocketAddr) -> Self {
        Self {
            relay_addr,
            ..Default::default()
        }
    }

    /// Address of a peer's acceptor given its advertised port.
    pub fn peer_addr(&self, listen_port: u16) -> SocketAddr {
        SocketAddr::new(self.peer_host, listen_port)
    }
}
