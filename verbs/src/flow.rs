// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Hardware flow steering.
//!
//! One installed rule per endpoint: destination MAC, destination IPv4, and
//! destination UDP port, each matched under an all-ones mask, so the receive
//! queue sees exactly the requested streams and nothing else.

use std::ptr::NonNull;

use net::Endpoint;
use nix::errno::Errno;
use tracing::error;

use crate::qp::{PortNumber, QueuePair};

/// Error type for flow installation failures.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("failed to install steering rule for {endpoint}: {errno}")]
    Create { endpoint: Endpoint, errno: Errno },
}

/// The three-spec classification rule, laid out exactly as the attach verb
/// consumes it: the attribute block immediately followed by its specs.
#[repr(C, packed)]
struct MulticastUdpRule {
    attr: verbs_sys::ibv_flow_attr,
    eth: verbs_sys::ibv_flow_spec_eth,
    ip: verbs_sys::ibv_flow_spec_ipv4,
    udp: verbs_sys::ibv_flow_spec_tcp_udp,
}

/// An installed steering rule, held until teardown.
#[derive(Debug)]
pub struct Flow {
    inner: NonNull<verbs_sys::ibv_flow>,
}

unsafe impl Send for Flow {}

impl Flow {
    /// Steer one multicast UDP stream into `qp`'s receive queue.
    pub fn steer(qp: &QueuePair, endpoint: Endpoint, port: PortNumber) -> Result<Flow, FlowError> {
        let mut rule = MulticastUdpRule {
            attr: verbs_sys::ibv_flow_attr {
                comp_mask: 0,
                type_: verbs_sys::ibv_flow_attr_type::IBV_FLOW_ATTR_NORMAL,
                size: std::mem::size_of::<MulticastUdpRule>() as u16,
                priority: 0,
                num_of_specs: 3,
                port: port.as_u8(),
                flags: 0,
            },
            eth: verbs_sys::ibv_flow_spec_eth {
                type_: verbs_sys::ibv_flow_spec_type::IBV_FLOW_SPEC_ETH,
                size: std::mem::size_of::<verbs_sys::ibv_flow_spec_eth>() as u16,
                val: verbs_sys::ibv_flow_eth_filter {
                    dst_mac: endpoint.group_mac().into(),
                    ..Default::default()
                },
                mask: verbs_sys::ibv_flow_eth_filter {
                    dst_mac: [0xff; 6],
                    ..Default::default()
                },
            },
            ip: verbs_sys::ibv_flow_spec_ipv4 {
                type_: verbs_sys::ibv_flow_spec_type::IBV_FLOW_SPEC_IPV4,
                size: std::mem::size_of::<verbs_sys::ibv_flow_spec_ipv4>() as u16,
                val: verbs_sys::ibv_flow_ipv4_filter {
                    src_ip: 0,
                    dst_ip: u32::from_ne_bytes(endpoint.group().octets()),
                },
                mask: verbs_sys::ibv_flow_ipv4_filter {
                    src_ip: 0,
                    dst_ip: u32::MAX,
                },
            },
            udp: verbs_sys::ibv_flow_spec_tcp_udp {
                type_: verbs_sys::ibv_flow_spec_type::IBV_FLOW_SPEC_UDP,
                size: std::mem::size_of::<verbs_sys::ibv_flow_spec_tcp_udp>() as u16,
                val: verbs_sys::ibv_flow_tcp_udp_filter {
                    dst_port: endpoint.port().to_be(),
                    src_port: 0,
                },
                mask: verbs_sys::ibv_flow_tcp_udp_filter {
                    dst_port: u16::MAX,
                    src_port: 0,
                },
            },
        };

        // SAFETY: the rule block is a packed attribute header followed by
        // `num_of_specs` specs whose size fields match their layouts; the
        // attach verb reads `attr.size` bytes from the attribute pointer.
        let flow = unsafe {
            verbs_sys::ibv_create_flow(qp.as_ptr(), std::ptr::addr_of_mut!(rule.attr))
        };
        match NonNull::new(flow) {
            Some(inner) => Ok(Flow { inner }),
            None => Err(FlowError::Create {
                endpoint,
                errno: Errno::last(),
            }),
        }
    }
}

impl Drop for Flow {
    fn drop(&mut self) {
        // SAFETY: `inner` is the flow handle returned at installation.
        let ret = unsafe { verbs_sys::ibv_destroy_flow(self.inner.as_ptr()) };
        if ret != 0 {
            error!("failed to destroy steering rule: {}", Errno::from_raw(ret));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rule_layout_is_attr_then_specs() {
        // The attach verb walks specs by offset, so the packed layout must
        // place them back to back in declaration order.
        assert_eq!(std::mem::offset_of!(MulticastUdpRule, attr), 0);
        assert_eq!(
            std::mem::offset_of!(MulticastUdpRule, eth),
            std::mem::size_of::<verbs_sys::ibv_flow_attr>()
        );
        assert_eq!(
            std::mem::offset_of!(MulticastUdpRule, ip),
            std::mem::size_of::<verbs_sys::ibv_flow_attr>()
                + std::mem::size_of::<verbs_sys::ibv_flow_spec_eth>()
        );
        assert_eq!(
            std::mem::size_of::<MulticastUdpRule>(),
            std::mem::size_of::<verbs_sys::ibv_flow_attr>()
                + std::mem::size_of::<verbs_sys::ibv_flow_spec_eth>()
                + std::mem::size_of::<verbs_sys::ibv_flow_spec_ipv4>()
                + std::mem::size_of::<verbs_sys::ibv_flow_spec_tcp_udp>()
        );
    }
}
