// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Protection domain ownership.

use std::ptr::NonNull;

use nix::errno::Errno;
use tracing::error;

use crate::cm::CmId;

/// Error type for protection domain allocation failures.
#[derive(Debug, thiserror::Error)]
pub enum PdError {
    #[error("failed to allocate protection domain: {0}")]
    Alloc(Errno),
}

/// Owner of an `ibv_pd`.
///
/// Every memory region and queue pair in this workspace is created inside
/// one protection domain; the domain must outlive all of them.
#[derive(Debug)]
pub struct ProtectionDomain {
    inner: NonNull<verbs_sys::ibv_pd>,
}

unsafe impl Send for ProtectionDomain {}
unsafe impl Sync for ProtectionDomain {}

impl ProtectionDomain {
    pub fn new(cm: &CmId) -> Result<ProtectionDomain, PdError> {
        let pd = unsafe { verbs_sys::ibv_alloc_pd(cm.context()) };
        match NonNull::new(pd) {
            Some(inner) => Ok(ProtectionDomain { inner }),
            None => Err(PdError::Alloc(Errno::last())),
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut verbs_sys::ibv_pd {
        self.inner.as_ptr()
    }
}

impl Drop for ProtectionDomain {
    fn drop(&mut self) {
        // SAFETY: `inner` is the domain this wrapper allocated; all regions
        // and queue pairs inside it are gone by teardown order.
        let ret = unsafe { verbs_sys::ibv_dealloc_pd(self.inner.as_ptr()) };
        if ret != 0 {
            error!("failed to deallocate protection domain: {}", Errno::from_raw(ret));
        }
    }
}
