use std::{
    fmt, io,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs},
};

use crate::constants::HOST_ANY;

/// Endpoint address in the native transport's representation:
/// a numeric IPv4 host plus a port.
///
/// The numeric form is what the engine consumes; conversions to and from
/// `SocketAddr` and textual host names are provided for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    host: u32,
    port: u16,
}

impl Address {
    /// Creates an address from a numeric host value and port.
    pub fn new(host: u32, port: u16) -> Self {
        Self { host, port }
    }

    /// Creates an address bound to any interface on the given port.
    pub fn any(port: u16) -> Self {
        Self { host: HOST_ANY, port }
    }

    /// Returns the numeric host value.
    pub fn host(&self) -> u32 {
        self.host
    }

    /// Returns the port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves a host name to an address using DNS.
    ///
    /// The first resolved IPv4 address wins; IPv6 results are skipped since
    /// the native engine speaks numeric IPv4 hosts.
    pub fn resolve(hostname: &str, port: u16) -> io::Result<Self> {
        let candidates = format!("{}:{}", hostname, port).to_socket_addrs()?;
        for candidate in candidates {
            if let IpAddr::V4(ip) = candidate.ip() {
                return Ok(Self { host: u32::from(ip), port });
            }
        }
        Err(io::Error::new(io::ErrorKind::NotFound, "could not resolve hostname to an IPv4 address"))
    }

    /// Returns the address as a standard socket address.
    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(self.host), self.port))
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Self { host: u32::from(*addr.ip()), port: addr.port() }
    }
}

impl TryFrom<SocketAddr> for Address {
    type Error = io::Error;

    fn try_from(addr: SocketAddr) -> io::Result<Self> {
        match addr {
            SocketAddr::V4(v4) => Ok(Self::from(v4)),
            SocketAddr::V6(_) => {
                Err(io::Error::new(io::ErrorKind::InvalidInput, "IPv6 is not representable"))
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Ipv4Addr::from(self.host), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_socket_addr() {
        let addr = Address::new(u32::from(Ipv4Addr::new(127, 0, 0, 1)), 9000);
        let socket_addr = addr.to_socket_addr();
        assert_eq!(Address::try_from(socket_addr).unwrap(), addr);
        assert_eq!(addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_any_uses_host_sentinel() {
        let addr = Address::any(7777);
        assert_eq!(addr.host(), HOST_ANY);
        assert_eq!(addr.port(), 7777);
    }

    #[test]
    fn test_resolves_localhost() {
        let addr = Address::resolve("localhost", 8080).unwrap();
        assert_eq!(addr.port(), 8080);
    }
}
