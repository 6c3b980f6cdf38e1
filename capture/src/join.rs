// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! IGMP group membership.
//!
//! Flow steering delivers the frames, but switches and the local stack only
//! forward multicast once somebody joins the group, so a plain UDP socket
//! announces membership for every endpoint. Its data path is never read; it
//! exists for the joins and is closed at teardown.

use std::net::Ipv4Addr;
use std::os::fd::OwnedFd;

use net::Endpoint;
use nix::errno::Errno;
use nix::sys::socket::{setsockopt, socket, sockopt, AddressFamily, IpMembershipRequest, SockFlag, SockType};
use tracing::debug;

/// The membership-holding socket.
#[derive(Debug)]
pub struct JoinSocket {
    _fd: OwnedFd,
}

impl JoinSocket {
    pub fn open(interface: Ipv4Addr, endpoints: &[Endpoint]) -> Result<JoinSocket, Errno> {
        let fd = socket(
            AddressFamily::Inet,
            SockType::Datagram,
            SockFlag::empty(),
            None,
        )?;
        setsockopt(&fd, sockopt::ReuseAddr, &true)?;
        for endpoint in endpoints {
            let request = IpMembershipRequest::new(endpoint.group(), Some(interface));
            setsockopt(&fd, sockopt::IpAddMembership, &request)?;
            debug!("joined {endpoint} on {interface}");
        }
        Ok(JoinSocket { _fd: fd })
    }
}
