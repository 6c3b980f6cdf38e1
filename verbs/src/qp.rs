// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Raw-packet queue pair creation, state transitions, and receive posting.

use std::ptr::NonNull;

use nix::errno::Errno;
use tracing::error;

use crate::cq::CompletionQueue;
use crate::pd::ProtectionDomain;

/// A physical device port number.
///
/// This is a newtype around `u8` to provide type safety and prevent
/// accidental misuse.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortNumber(pub u8);

impl PortNumber {
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// Error type for queue pair creation failures.
#[derive(Debug, thiserror::Error)]
pub enum QpCreateError {
    #[error("failed to create raw packet queue pair with {max_recv_wr} receive slots: {errno}")]
    Create { max_recv_wr: u32, errno: Errno },
}

/// Error type for queue pair state transition failures.
#[derive(Debug, thiserror::Error)]
pub enum ModifyError {
    #[error("failed to transition queue pair to INIT on port {port}: {errno}")]
    ToInit { port: u8, errno: Errno },
    #[error("failed to transition queue pair to RTR: {errno}")]
    ToRtr { errno: Errno },
}

/// Error type for receive posting failures.
#[derive(Debug, thiserror::Error)]
#[error("failed to post receive work requests: {0}")]
pub struct PostRecvError(pub Errno);

/// Owner of a raw-packet `ibv_qp`.
///
/// Pure capture never sends: the send side is sized at its minimum and the
/// queue pair only ever walks INIT → RTR.
#[derive(Debug)]
pub struct QueuePair {
    inner: NonNull<verbs_sys::ibv_qp>,
}

unsafe impl Send for QueuePair {}
unsafe impl Sync for QueuePair {}

impl QueuePair {
    /// Create a raw-packet queue pair with room for `max_recv_wr` outstanding
    /// single-SGE receives, completing onto `cq`.
    pub fn new(
        pd: &ProtectionDomain,
        cq: &CompletionQueue,
        max_recv_wr: u32,
    ) -> Result<QueuePair, QpCreateError> {
        let mut attr = verbs_sys::ibv_qp_init_attr {
            qp_context: std::ptr::null_mut(),
            send_cq: cq.as_ptr(),
            recv_cq: cq.as_ptr(),
            srq: std::ptr::null_mut(),
            cap: verbs_sys::ibv_qp_cap {
                max_send_wr: 1,
                max_recv_wr,
                max_send_sge: 1,
                max_recv_sge: 1,
                max_inline_data: 0,
            },
            qp_type: verbs_sys::ibv_qp_type::IBV_QPT_RAW_PACKET,
            sq_sig_all: 0,
        };
        let qp = unsafe { verbs_sys::ibv_create_qp(pd.as_ptr(), &mut attr) };
        match NonNull::new(qp) {
            Some(inner) => Ok(QueuePair { inner }),
            None => Err(QpCreateError::Create {
                max_recv_wr,
                errno: Errno::last(),
            }),
        }
    }

    /// RESET → INIT, attaching the queue pair to a physical port.
    pub fn to_init(&self, port: PortNumber) -> Result<(), ModifyError> {
        let mut attr = verbs_sys::ibv_qp_attr {
            qp_state: verbs_sys::ibv_qp_state::IBV_QPS_INIT,
            port_num: port.as_u8(),
            ..Default::default()
        };
        let ret = unsafe {
            verbs_sys::ibv_modify_qp(
                self.inner.as_ptr(),
                &mut attr,
                verbs_sys::IBV_QP_STATE | verbs_sys::IBV_QP_PORT,
            )
        };
        if ret != 0 {
            return Err(ModifyError::ToInit {
                port: port.as_u8(),
                errno: Errno::from_raw(ret),
            });
        }
        Ok(())
    }

    /// INIT → RTR. Receives start landing once this returns; the work
    /// requests and flows must already be in place.
    pub fn to_rtr(&self) -> Result<(), ModifyError> {
        let mut attr = verbs_sys::ibv_qp_attr {
            qp_state: verbs_sys::ibv_qp_state::IBV_QPS_RTR,
            ..Default::default()
        };
        let ret = unsafe {
            verbs_sys::ibv_modify_qp(self.inner.as_ptr(), &mut attr, verbs_sys::IBV_QP_STATE)
        };
        if ret != 0 {
            return Err(ModifyError::ToRtr {
                errno: Errno::from_raw(ret),
            });
        }
        Ok(())
    }

    /// Post a chain of receive work requests.
    ///
    /// # Safety
    ///
    /// `head` must lead a well-formed `next`-linked chain whose scatter/gather
    /// entries reference memory registered in this queue pair's protection
    /// domain, and that memory (and the chain itself) must stay in place until
    /// each request completes. No request in the chain may already be posted.
    pub unsafe fn post_recv(&self, head: *mut verbs_sys::ibv_recv_wr) -> Result<(), PostRecvError> {
        let mut bad: *mut verbs_sys::ibv_recv_wr = std::ptr::null_mut();
        let ret = unsafe { verbs_sys::ibv_post_recv(self.inner.as_ptr(), head, &mut bad) };
        if ret != 0 {
            return Err(PostRecvError(Errno::from_raw(ret)));
        }
        Ok(())
    }

    pub(crate) fn as_ptr(&self) -> *mut verbs_sys::ibv_qp {
        self.inner.as_ptr()
    }
}

impl Drop for QueuePair {
    fn drop(&mut self) {
        // SAFETY: `inner` is the queue pair this wrapper created; flows on it
        // are destroyed first by teardown order.
        let ret = unsafe { verbs_sys::ibv_destroy_qp(self.inner.as_ptr()) };
        if ret != 0 {
            error!("failed to destroy queue pair: {}", Errno::from_raw(ret));
        }
    }
}
