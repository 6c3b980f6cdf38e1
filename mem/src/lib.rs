// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Pinned memory buffers.
//!
//! DMA targets and the writer's staging area must never move, so they are
//! carved straight out of anonymous mappings rather than the Rust heap. Huge
//! pages are attempted first to cut TLB pressure at wire speed; plain pages
//! are the fallback.

use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use tracing::{debug, error};

const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Error type for pinned allocation failures.
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    #[error("cannot allocate an empty pinned buffer")]
    ZeroLength,
    #[error("mmap failed: {0}")]
    Map(Errno),
}

/// A page-aligned, non-relocating byte buffer backed by an anonymous mapping.
///
/// The address is stable for the life of the buffer, which makes it safe to
/// hand to NIC memory registration and to keep scatter/gather descriptors
/// pointing into it.
#[derive(Debug)]
pub struct PinnedBuffer {
    ptr: NonNull<libc::c_void>,
    len: usize,
    mapped: usize,
}

// The mapping is exclusively owned; nothing else aliases it.
unsafe impl Send for PinnedBuffer {}
unsafe impl Sync for PinnedBuffer {}

impl PinnedBuffer {
    /// Allocate `len` zeroed bytes, preferring huge pages.
    ///
    /// The huge-page attempt maps a multiple of the huge page size; if the
    /// system has no huge pages available the allocation silently falls back
    /// to normal pages, as capture works either way.
    pub fn new(len: usize) -> Result<PinnedBuffer, AllocError> {
        let Some(request) = NonZeroUsize::new(len) else {
            return Err(AllocError::ZeroLength);
        };
        let prot = ProtFlags::PROT_READ | ProtFlags::PROT_WRITE;
        let flags = MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS | MapFlags::MAP_POPULATE;

        let huge_len = len.div_ceil(HUGE_PAGE_SIZE) * HUGE_PAGE_SIZE;
        if let Some(huge_request) = NonZeroUsize::new(huge_len) {
            match unsafe { mmap_anonymous(None, huge_request, prot, flags | MapFlags::MAP_HUGETLB) } {
                Ok(ptr) => {
                    debug!("allocated {huge_len} huge-page bytes");
                    return Ok(PinnedBuffer {
                        ptr,
                        len,
                        mapped: huge_len,
                    });
                }
                Err(errno) => {
                    debug!("huge-page mmap of {huge_len} bytes unavailable ({errno}), falling back")
                }
            }
        }

        let ptr = unsafe { mmap_anonymous(None, request, prot, flags) }.map_err(AllocError::Map)?;
        Ok(PinnedBuffer {
            ptr,
            len,
            mapped: len,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the mapping.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr().cast()
    }
}

impl Deref for PinnedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the mapping is live, readable, and at least `len` long.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }
}

impl DerefMut for PinnedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is live, writable, and at least `len` long.
        unsafe { std::slice::from_raw_parts_mut(self.as_ptr(), self.len) }
    }
}

impl Drop for PinnedBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`mapped` describe exactly the region mmap returned.
        if let Err(errno) = unsafe { munmap(self.ptr, self.mapped) } {
            error!("munmap of pinned buffer failed: {errno}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_zero_length() {
        assert!(matches!(PinnedBuffer::new(0), Err(AllocError::ZeroLength)));
    }

    #[test]
    fn allocates_zeroed_and_writable() {
        let mut buf = PinnedBuffer::new(4096).unwrap();
        assert_eq!(buf.len(), 4096);
        assert!(buf.iter().all(|&b| b == 0));
        buf[0] = 0xAB;
        buf[4095] = 0xCD;
        assert_eq!(buf[0], 0xAB);
        assert_eq!(buf[4095], 0xCD);
    }

    #[test]
    fn address_is_stable_across_moves() {
        let buf = PinnedBuffer::new(1024).unwrap();
        let before = buf.as_ptr();
        let moved = buf;
        assert_eq!(before, moved.as_ptr());
    }

    #[test]
    fn odd_sizes_survive_huge_page_rounding() {
        let buf = PinnedBuffer::new(HUGE_PAGE_SIZE + 1).unwrap();
        assert_eq!(buf.len(), HUGE_PAGE_SIZE + 1);
    }
}
