// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! RDMA connection-manager objects: the event channel and the connection id
//! that binds capture to one local interface, and through it to one device
//! and port.

use std::net::Ipv4Addr;
use std::ptr::NonNull;

use nix::errno::Errno;
use tracing::error;

use crate::qp::PortNumber;

/// Error type for event channel creation failures.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to create rdma event channel: {0}")]
    Create(Errno),
}

/// Error type for connection id creation failures.
#[derive(Debug, thiserror::Error)]
pub enum CmIdError {
    #[error("failed to create rdma connection id: {0}")]
    Create(Errno),
}

/// Error type for address binding failures.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("failed to bind to interface address {addr}: {errno}")]
    Bind { addr: Ipv4Addr, errno: Errno },
    #[error("interface address {addr} did not resolve to a verbs device")]
    NoDevice { addr: Ipv4Addr },
}

/// Owner of an `rdma_event_channel`.
///
/// Capture never blocks on connection-manager events; the channel exists
/// because connection ids require one.
#[derive(Debug)]
pub struct EventChannel {
    inner: NonNull<verbs_sys::rdma_event_channel>,
}

unsafe impl Send for EventChannel {}

impl EventChannel {
    pub fn new() -> Result<EventChannel, ChannelError> {
        let channel = unsafe { verbs_sys::rdma_create_event_channel() };
        match NonNull::new(channel) {
            Some(inner) => Ok(EventChannel { inner }),
            None => Err(ChannelError::Create(Errno::last())),
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut verbs_sys::rdma_event_channel {
        self.inner.as_ptr()
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        // SAFETY: `inner` is the channel this wrapper was constructed with
        // and every id created on it has been destroyed by now.
        unsafe { verbs_sys::rdma_destroy_event_channel(self.inner.as_ptr()) }
    }
}

/// Owner of an `rdma_cm_id` opened for UDP port space.
///
/// Binding the id to a local IPv4 address selects the verbs device and
/// physical port that every later object hangs off. Must not outlive the
/// [`EventChannel`] it was created on.
#[derive(Debug)]
pub struct CmId {
    inner: NonNull<verbs_sys::rdma_cm_id>,
}

unsafe impl Send for CmId {}

impl CmId {
    pub fn new(channel: &EventChannel) -> Result<CmId, CmIdError> {
        let mut id: *mut verbs_sys::rdma_cm_id = std::ptr::null_mut();
        let ret = unsafe {
            verbs_sys::rdma_create_id(
                channel.as_ptr(),
                &mut id,
                std::ptr::null_mut(),
                verbs_sys::rdma_port_space::RDMA_PS_UDP,
            )
        };
        if ret != 0 {
            return Err(CmIdError::Create(Errno::last()));
        }
        match NonNull::new(id) {
            Some(inner) => Ok(CmId { inner }),
            None => Err(CmIdError::Create(Errno::EINVAL)),
        }
    }

    /// Bind to a local interface address, resolving the verbs device.
    pub fn bind(&mut self, addr: Ipv4Addr) -> Result<(), BindError> {
        let sin = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: 0,
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes(addr.octets()),
            },
            sin_zero: [0; 8],
        };
        let ret = unsafe {
            verbs_sys::rdma_bind_addr(
                self.inner.as_ptr(),
                std::ptr::addr_of!(sin).cast_mut().cast::<libc::sockaddr>(),
            )
        };
        if ret != 0 {
            return Err(BindError::Bind {
                addr,
                errno: Errno::last(),
            });
        }
        // A bind to an address that is local but not on an RDMA-capable
        // interface leaves the id without a device context.
        if unsafe { self.inner.as_ref() }.verbs.is_null() {
            return Err(BindError::NoDevice { addr });
        }
        Ok(())
    }

    /// The physical port the bound address lives on.
    #[must_use]
    pub fn port_num(&self) -> PortNumber {
        PortNumber(unsafe { self.inner.as_ref() }.port_num)
    }

    /// Device context selected by [`CmId::bind`].
    pub(crate) fn context(&self) -> *mut verbs_sys::ibv_context {
        unsafe { self.inner.as_ref() }.verbs
    }
}

impl Drop for CmId {
    fn drop(&mut self) {
        // SAFETY: `inner` is the id this wrapper was constructed with.
        let ret = unsafe { verbs_sys::rdma_destroy_id(self.inner.as_ptr()) };
        if ret != 0 {
            error!("failed to destroy rdma connection id: {}", Errno::last());
        }
    }
}
