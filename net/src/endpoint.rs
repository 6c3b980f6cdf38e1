// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Multicast capture endpoints.

use std::fmt::{self, Display};
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::eth::MacAddress;

/// A `(multicast IPv4 group, UDP port)` pair naming one stream to capture.
///
/// Construction validates the group: anything outside 224.0.0.0/4 is
/// rejected, including any IPv6 literal that survives the textual split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    group: Ipv4Addr,
    port: u16,
}

/// Error type for endpoint construction and parsing failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Address {0} is not a multicast address")]
    NotMulticast(String),
    #[error("Invalid port number {0}")]
    InvalidPort(String),
    #[error("missing ':' between group and port in {0}")]
    MissingPort(String),
}

impl Endpoint {
    pub fn new(group: Ipv4Addr, port: u16) -> Result<Endpoint, EndpointError> {
        if !group.is_multicast() {
            return Err(EndpointError::NotMulticast(group.to_string()));
        }
        Ok(Endpoint { group, port })
    }

    #[must_use]
    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The Ethernet group address frames for this endpoint carry on the wire.
    #[must_use]
    pub fn group_mac(&self) -> MacAddress {
        MacAddress::multicast_for(self.group)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Split on the rightmost `:` so bracketed IPv6 literals parse far enough
    /// to be rejected as non-IPv4-multicast rather than as syntax errors.
    fn from_str(s: &str) -> Result<Endpoint, EndpointError> {
        let Some((group, port)) = s.rsplit_once(':') else {
            return Err(EndpointError::MissingPort(s.to_string()));
        };
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;
        let group: Ipv4Addr = group
            .parse()
            .map_err(|_| EndpointError::NotMulticast(group.to_string()))?;
        Endpoint::new(group, port)
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.port)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_group_and_port() {
        let ep: Endpoint = "239.1.1.1:7148".parse().unwrap();
        assert_eq!(ep.group(), Ipv4Addr::new(239, 1, 1, 1));
        assert_eq!(ep.port(), 7148);
    }

    #[test]
    fn rejects_unicast_group() {
        let err = "10.0.0.1:7148".parse::<Endpoint>().unwrap_err();
        assert_eq!(err, EndpointError::NotMulticast("10.0.0.1".to_string()));
        assert!(err.to_string().contains("not a multicast address"));
    }

    #[test]
    fn rejects_ipv6_group() {
        // The rightmost-colon split leaves an IPv6-ish group part, which the
        // IPv4 parse then rejects.
        let err = "[ff02::1]:7148".parse::<Endpoint>().unwrap_err();
        assert!(matches!(err, EndpointError::NotMulticast(_)));
    }

    #[test]
    fn rejects_bad_port() {
        assert_eq!(
            "239.1.1.1:port".parse::<Endpoint>(),
            Err(EndpointError::InvalidPort("port".to_string()))
        );
        assert_eq!(
            "239.1.1.1:65536".parse::<Endpoint>(),
            Err(EndpointError::InvalidPort("65536".to_string()))
        );
    }

    #[test]
    fn rejects_missing_port() {
        assert!(matches!(
            "239.1.1.1".parse::<Endpoint>(),
            Err(EndpointError::MissingPort(_))
        ));
    }

    #[test]
    fn group_mac_matches_group() {
        let ep: Endpoint = "239.1.1.1:7148".parse().unwrap();
        assert_eq!(ep.group_mac(), MacAddress([0x01, 0x00, 0x5e, 0x01, 0x01, 0x01]));
    }
}
