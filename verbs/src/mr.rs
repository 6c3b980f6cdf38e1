// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Memory registration.

use std::ptr::NonNull;

use mem::PinnedBuffer;
use nix::errno::Errno;
use tracing::error;

use crate::pd::ProtectionDomain;

/// Error type for memory registration failures.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("failed to register {length} bytes for local write: {errno}")]
    Register { length: usize, errno: Errno },
}

/// Owner of an `ibv_mr` over one pinned buffer.
///
/// The registration is local-write only; the NIC DMAs received frames into
/// it and nothing reads it remotely.
#[derive(Debug)]
pub struct MemoryRegion {
    inner: NonNull<verbs_sys::ibv_mr>,
}

unsafe impl Send for MemoryRegion {}
unsafe impl Sync for MemoryRegion {}

impl MemoryRegion {
    /// Register `buf` with the device.
    ///
    /// # Safety
    ///
    /// The caller must keep `buf` alive and at its current address for the
    /// whole life of the returned region, and must drop the region before the
    /// protection domain. Holding both in one struct with the region declared
    /// first satisfies both.
    pub unsafe fn register(
        pd: &ProtectionDomain,
        buf: &PinnedBuffer,
    ) -> Result<MemoryRegion, RegisterError> {
        let mr = unsafe {
            verbs_sys::ibv_reg_mr(
                pd.as_ptr(),
                buf.as_ptr().cast(),
                buf.len(),
                verbs_sys::IBV_ACCESS_LOCAL_WRITE,
            )
        };
        match NonNull::new(mr) {
            Some(inner) => Ok(MemoryRegion { inner }),
            None => Err(RegisterError::Register {
                length: buf.len(),
                errno: Errno::last(),
            }),
        }
    }

    /// The local key scatter/gather entries name this registration by.
    #[must_use]
    pub fn lkey(&self) -> u32 {
        unsafe { self.inner.as_ref() }.lkey
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        // SAFETY: `inner` is the registration this wrapper created and no
        // work request referencing it is still outstanding.
        let ret = unsafe { verbs_sys::ibv_dereg_mr(self.inner.as_ptr()) };
        if ret != 0 {
            error!("failed to deregister memory region: {}", Errno::from_raw(ret));
        }
    }
}
