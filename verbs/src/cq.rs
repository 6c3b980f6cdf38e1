// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Completion queue ownership and polling.

use std::ptr::NonNull;

use nix::errno::Errno;
use tracing::error;

use crate::cm::CmId;

/// Error type for completion queue creation failures.
#[derive(Debug, thiserror::Error)]
pub enum CqError {
    #[error("failed to create completion queue of depth {depth}: {errno}")]
    Create { depth: u32, errno: Errno },
}

/// Error type for completion queue polling failures.
#[derive(Debug, thiserror::Error)]
#[error("failed to poll completion queue: {0}")]
pub struct PollError(pub Errno);

/// One hardware completion record.
///
/// Transparent over the wire-format entry so a `&mut [Completion]` can be
/// handed to the poll verb directly.
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct Completion(verbs_sys::ibv_wc);

impl Completion {
    /// A blank entry for building poll arrays.
    #[must_use]
    pub fn empty() -> Completion {
        Completion(verbs_sys::ibv_wc {
            wr_id: 0,
            status: verbs_sys::ibv_wc_status::IBV_WC_SUCCESS,
            opcode: verbs_sys::ibv_wc_opcode::IBV_WC_RECV,
            vendor_err: 0,
            byte_len: 0,
            imm_data: 0,
            qp_num: 0,
            src_qp: 0,
            wc_flags: 0,
            pkey_index: 0,
            slid: 0,
            sl: 0,
            dlid_path_bits: 0,
        })
    }

    /// The caller-chosen tag of the work request this completion retires.
    #[must_use]
    pub fn wr_id(&self) -> u64 {
        self.0.wr_id
    }

    /// Bytes the NIC delivered for this frame.
    #[must_use]
    pub fn byte_len(&self) -> u32 {
        self.0.byte_len
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.0.status == verbs_sys::ibv_wc_status::IBV_WC_SUCCESS
    }

    #[must_use]
    pub fn status(&self) -> verbs_sys::ibv_wc_status {
        self.0.status
    }

    #[must_use]
    pub fn vendor_err(&self) -> u32 {
        self.0.vendor_err
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("wr_id", &self.0.wr_id)
            .field("status", &self.0.status)
            .field("byte_len", &self.0.byte_len)
            .finish()
    }
}

/// Owner of an `ibv_cq` deep enough for every outstanding receive.
#[derive(Debug)]
pub struct CompletionQueue {
    inner: NonNull<verbs_sys::ibv_cq>,
}

unsafe impl Send for CompletionQueue {}
unsafe impl Sync for CompletionQueue {}

impl CompletionQueue {
    pub fn new(cm: &CmId, depth: u32) -> Result<CompletionQueue, CqError> {
        let cq = unsafe {
            verbs_sys::ibv_create_cq(
                cm.context(),
                depth as libc::c_int,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                0,
            )
        };
        match NonNull::new(cq) {
            Some(inner) => Ok(CompletionQueue { inner }),
            None => Err(CqError::Create {
                depth,
                errno: Errno::last(),
            }),
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut verbs_sys::ibv_cq {
        self.inner.as_ptr()
    }

    /// Drain up to `wc.len()` completions without blocking.
    ///
    /// Returns how many entries were filled; zero means the queue was empty.
    pub fn poll(&self, wc: &mut [Completion]) -> Result<usize, PollError> {
        // SAFETY: `wc` is a contiguous array of wire-format entries at least
        // `wc.len()` long, and the queue is live.
        let n = unsafe {
            verbs_sys::ibv_poll_cq(
                self.inner.as_ptr(),
                wc.len() as libc::c_int,
                wc.as_mut_ptr().cast::<verbs_sys::ibv_wc>(),
            )
        };
        if n < 0 {
            return Err(PollError(Errno::from_raw(-n)));
        }
        Ok(n as usize)
    }
}

impl Drop for CompletionQueue {
    fn drop(&mut self) {
        // SAFETY: `inner` is the queue this wrapper created; the queue pair
        // attached to it is gone by teardown order.
        let ret = unsafe { verbs_sys::ibv_destroy_cq(self.inner.as_ptr()) };
        if ret != 0 {
            error!("failed to destroy completion queue: {}", Errno::from_raw(ret));
        }
    }
}
