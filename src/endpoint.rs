//! # Endpoint Resolution
//!
//! Maps the port-binding table a container runtime publishes onto a single
//! dialable socket address.
//!
//! Two details make this more than a map lookup:
//!
//! - A binding on the wildcard address (`0.0.0.0` or `::`) is not a dial
//!   target. It is replaced with the matching loopback address.
//! - When the runtime daemon lives on another machine (`DOCKER_HOST=tcp://...`)
//!   the binding's address is only meaningful on that machine, so the daemon's
//!   address takes precedence.
//!
//! [`resolve`] performs no I/O. Host names in the daemon URI are looked up
//! ahead of time with [`DaemonUri::resolve_host`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use tracing::debug;
use url::Url;

/// Transport protocol of a declared container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Sctp => write!(f, "sctp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "sctp" => Ok(Protocol::Sctp),
            other => Err(EndpointParseError(format!("unknown protocol '{other}'"))),
        }
    }
}

/// Error raised when a runtime-reported key or binding cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EndpointParseError(String);

/// Key of the binding table: a declared container port and its protocol.
///
/// Displays and parses in the runtime's `"5432/tcp"` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortKey {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortKey {
    pub fn new(port: u16, protocol: Protocol) -> Self {
        Self { port, protocol }
    }

    pub fn tcp(port: u16) -> Self {
        Self::new(port, Protocol::Tcp)
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl FromStr for PortKey {
    type Err = EndpointParseError;

    /// Accepts `"5432/tcp"`; a bare `"5432"` is taken as TCP.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, protocol) = match s.split_once('/') {
            Some((port, protocol)) => (port, protocol.parse()?),
            None => (s, Protocol::Tcp),
        };
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| EndpointParseError(format!("invalid port in '{s}': {e}")))?;
        Ok(Self { port, protocol })
    }
}

/// One published host-side endpoint for a container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostBinding {
    pub address: IpAddr,
    pub port: u16,
}

impl HostBinding {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// Parse the string pair a runtime reports. An empty address means the
    /// runtime bound every interface.
    pub fn parse(address: &str, port: &str) -> Result<Self, EndpointParseError> {
        let address = if address.trim().is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            parse_ip_host(address)
                .ok_or_else(|| EndpointParseError(format!("invalid host address '{address}'")))?
        };
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| EndpointParseError(format!("invalid host port '{port}': {e}")))?;
        Ok(Self { address, port })
    }
}

/// Port-binding table as published by the runtime.
///
/// A key may be present with no bindings while the runtime is still
/// publishing; [`resolve`] treats that the same as an absent key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortBindings {
    bindings: HashMap<PortKey, Vec<HostBinding>>,
}

impl PortBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding for `key`
    pub fn insert(&mut self, key: PortKey, binding: HostBinding) {
        self.bindings.entry(key).or_default().push(binding);
    }

    /// Declare `key` with no published bindings yet
    pub fn declare(&mut self, key: PortKey) {
        self.bindings.entry(key).or_default();
    }

    pub fn with_binding(mut self, key: PortKey, binding: HostBinding) -> Self {
        self.insert(key, binding);
        self
    }

    pub fn get(&self, key: &PortKey) -> &[HostBinding] {
        self.bindings.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.values().all(Vec::is_empty)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PortKey> {
        self.bindings.keys()
    }
}

impl FromIterator<(PortKey, HostBinding)> for PortBindings {
    fn from_iter<T: IntoIterator<Item = (PortKey, HostBinding)>>(iter: T) -> Self {
        let mut bindings = PortBindings::new();
        for (key, binding) in iter {
            bindings.insert(key, binding);
        }
        bindings
    }
}

/// The URI a runtime daemon is reached at, plus the concrete address it
/// stands for when one is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonUri {
    uri: Url,
    address: Option<IpAddr>,
}

impl DaemonUri {
    /// Parse a daemon URI. A literal IP host becomes the override address;
    /// host names stay unresolved until [`DaemonUri::resolve_host`] runs.
    pub fn parse(uri: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(Url::parse(uri)?))
    }

    pub fn from_url(uri: Url) -> Self {
        let address = uri.host_str().and_then(parse_ip_host);
        Self { uri, address }
    }

    /// Attach an address resolved elsewhere
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn host(&self) -> Option<&str> {
        self.uri.host_str().filter(|h| !h.is_empty())
    }

    /// Concrete address overriding binding addresses, if known
    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    /// Whether the URI names a network host at all (as opposed to a local
    /// socket such as `unix:///var/run/docker.sock`)
    pub fn is_network(&self) -> bool {
        matches!(self.uri.scheme(), "tcp" | "http" | "https") && self.host().is_some()
    }

    /// Look up a host name once so later resolution stays pure.
    ///
    /// Lookup failures leave the URI unresolved; the binding's own address is
    /// then used.
    pub async fn resolve_host(self) -> Self {
        if self.address.is_some() || !self.is_network() {
            return self;
        }
        let Some(host) = self.host().map(str::to_owned) else {
            return self;
        };
        let port = self.uri.port_or_known_default().unwrap_or(0);
        let lookup = tokio::net::lookup_host((host.as_str(), port)).await;
        match lookup {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => {
                    debug!(host = %host, address = %addr.ip(), "Resolved daemon host");
                    self.with_address(addr.ip())
                }
                None => self,
            },
            Err(e) => {
                debug!(host = %host, error = %e, "Daemon host lookup failed");
                self
            }
        }
    }
}

impl fmt::Display for DaemonUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// Resolve the endpoint to dial for `key`.
///
/// Returns `None` when the key is absent or has no published binding yet.
/// Otherwise the first binding is used, with its address replaced by the
/// daemon's address when known, or by loopback when the binding is a
/// wildcard. The port is never rewritten.
pub fn resolve(
    bindings: &PortBindings,
    key: PortKey,
    daemon_uri: Option<&DaemonUri>,
) -> Option<SocketAddr> {
    let binding = bindings.get(&key).first()?;

    let address = match daemon_uri.and_then(DaemonUri::address) {
        Some(daemon_address) => daemon_address,
        None => loopback_for_wildcard(binding.address),
    };

    Some(SocketAddr::new(address, binding.port))
}

fn loopback_for_wildcard(address: IpAddr) -> IpAddr {
    match address {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        other => other,
    }
}

/// Parse a host component as an IP address, accepting bracketed IPv6
fn parse_ip_host(host: &str) -> Option<IpAddr> {
    let trimmed = host.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(trimmed);
    unbracketed.parse().ok()
}
