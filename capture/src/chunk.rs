// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Chunks: the unit of hand-off between the NIC and the disk.
//!
//! A chunk owns one pinned arena of `max_records × snaplen` bytes plus a
//! parallel slot table. Each slot carries the receive work request the NIC
//! consumes, the scatter/gather entry aiming it at the arena, and the pcap
//! record header that later precedes the payload on disk. An interleaved
//! iovec table lets the disk thread walk header, payload, header, payload in
//! one pass over the same memory the NIC DMA'd into.

use mem::PinnedBuffer;
use pcap_io::RecordHeader;
use verbs::{MemoryRegion, PostRecvError, ProtectionDomain, QueuePair, RegisterError};

/// Nominal chunk payload size the slot count is derived from.
pub const NOMINAL_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Derived pool geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizing {
    pub max_records: u32,
    pub n_chunks: usize,
}

impl Sizing {
    /// Total receive slots across the pool; bounds the completion queue and
    /// receive queue depth.
    #[must_use]
    pub fn n_slots(&self) -> u32 {
        self.max_records * self.n_chunks as u32
    }
}

/// Error type for pool geometry failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SizingError {
    #[error("Too many buffered packets")]
    TooManySlots,
}

/// Split the buffer budget into chunks.
///
/// A snaplen above the nominal chunk size still yields one record per chunk,
/// and a budget below one chunk still yields one chunk; the 32-bit slot
/// counter is the only hard ceiling.
pub fn sizes(snaplen: u32, buffer: usize) -> Result<Sizing, SizingError> {
    let snaplen = snaplen as usize;
    let mut max_records = NOMINAL_CHUNK_SIZE / snaplen;
    if max_records == 0 {
        max_records = 1;
    }
    let chunk_size = max_records * snaplen;
    let mut n_chunks = buffer / chunk_size;
    if n_chunks == 0 {
        n_chunks += 1;
    }
    if (u32::MAX as usize) / max_records <= n_chunks {
        return Err(SizingError::TooManySlots);
    }
    Ok(Sizing {
        max_records: max_records as u32,
        n_chunks,
    })
}

/// Error type for chunk construction failures.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("failed to allocate chunk arena: {0}")]
    Alloc(#[from] mem::AllocError),
    #[error(transparent)]
    Register(#[from] RegisterError),
}

/// A completion arrived for a slot other than the next write index.
///
/// Completions on a raw-packet receive queue retire in posting order; seeing
/// anything else means the fill position is unknowable and capture must stop.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("completion for slot {got} arrived while slot {expected} was next")]
pub struct SlotOrderError {
    pub expected: u32,
    pub got: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Slot {
    wr: verbs_sys::ibv_recv_wr,
    sge: verbs_sys::ibv_sge,
    header: RecordHeader,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            wr: verbs_sys::ibv_recv_wr::default(),
            sge: verbs_sys::ibv_sge::default(),
            header: RecordHeader::default(),
        }
    }
}

/// A fixed-capacity batch of captured frames sharing one DMA arena.
pub struct Chunk {
    n_records: u32,
    n_bytes: u64,
    slots: Box<[Slot]>,
    iov: Box<[libc::iovec]>,
    // Field order is teardown order: deregister before the arena unmaps.
    mr: MemoryRegion,
    arena: PinnedBuffer,
}

// All pointers inside a chunk reference memory the chunk itself owns (the
// boxed slot table and the pinned arena), so moving the Chunk value between
// threads moves ownership of everything those pointers name.
unsafe impl Send for Chunk {}

impl Chunk {
    /// Build an empty chunk: allocate and register the arena, then wire up
    /// the slot table. Every pointer set here stays fixed for the chunk's
    /// life; later stages only update lengths and counters.
    pub fn new(pd: &ProtectionDomain, snaplen: u32, max_records: u32) -> Result<Chunk, ChunkError> {
        let records = max_records as usize;
        let arena = PinnedBuffer::new(records * snaplen as usize)?;
        // SAFETY: `arena` lives in this chunk alongside `mr`, declared so the
        // region drops first.
        let mr = unsafe { MemoryRegion::register(pd, &arena) }?;

        let mut slots = vec![Slot::default(); records].into_boxed_slice();
        let mut iov = vec![
            libc::iovec {
                iov_base: std::ptr::null_mut(),
                iov_len: 0,
            };
            2 * records
        ]
        .into_boxed_slice();

        let base = arena.as_ptr();
        for i in 0..records {
            let sge: *mut verbs_sys::ibv_sge = &mut slots[i].sge;
            slots[i].wr = verbs_sys::ibv_recv_wr {
                wr_id: i as u64,
                next: std::ptr::null_mut(),
                sg_list: sge,
                num_sge: 1,
            };
            slots[i].sge = verbs_sys::ibv_sge {
                addr: base as u64 + (i * snaplen as usize) as u64,
                length: snaplen,
                lkey: mr.lkey(),
            };
            let header: *mut RecordHeader = &mut slots[i].header;
            iov[2 * i] = libc::iovec {
                iov_base: header.cast(),
                iov_len: RecordHeader::SIZE,
            };
            iov[2 * i + 1] = libc::iovec {
                // SAFETY: `i < records`, so the offset stays inside the arena.
                iov_base: unsafe { base.add(i * snaplen as usize) }.cast(),
                iov_len: 0,
            };
        }
        for i in 0..records.saturating_sub(1) {
            let next: *mut verbs_sys::ibv_recv_wr = &mut slots[i + 1].wr;
            slots[i].wr.next = next;
        }

        Ok(Chunk {
            n_records: 0,
            n_bytes: 0,
            slots,
            iov,
            mr,
            arena,
        })
    }

    #[must_use]
    pub fn n_records(&self) -> u32 {
        self.n_records
    }

    #[must_use]
    pub fn n_bytes(&self) -> u64 {
        self.n_bytes
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.n_records == self.capacity()
    }

    /// Record one successful completion into the next slot.
    ///
    /// `wr_id` must equal the write index; slots retire in posting order and
    /// anything else is fatal rather than recoverable.
    pub fn complete(
        &mut self,
        wr_id: u64,
        byte_len: u32,
        ts: (u32, u32),
    ) -> Result<(), SlotOrderError> {
        if wr_id != u64::from(self.n_records) {
            return Err(SlotOrderError {
                expected: self.n_records,
                got: wr_id,
            });
        }
        let i = wr_id as usize;
        self.slots[i].header = RecordHeader {
            ts_sec: ts.0,
            ts_usec: ts.1,
            incl_len: byte_len,
            orig_len: byte_len,
        };
        self.iov[2 * i + 1].iov_len = byte_len as usize;
        self.n_records += 1;
        self.n_bytes += u64::from(byte_len) + RecordHeader::SIZE as u64;
        Ok(())
    }

    /// The interleaved header/payload table for the filled prefix.
    #[must_use]
    pub fn iov(&self) -> &[libc::iovec] {
        &self.iov[..2 * self.n_records as usize]
    }

    /// Zero the counters and hand every slot back to the NIC as one chained
    /// post. Only valid when no slot is still outstanding, which is why the
    /// disk thread never re-arms a short chunk.
    pub fn reset_and_post(&mut self, qp: &QueuePair) -> Result<(), PostRecvError> {
        self.n_records = 0;
        self.n_bytes = 0;
        // SAFETY: the chain and its scatter/gather targets live in this
        // chunk, registered against the queue pair's protection domain, and
        // every previous post has completed.
        unsafe { qp.post_recv(&mut self.slots[0].wr) }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nominal_chunk_holds_many_small_frames() {
        let sizing = sizes(100, 4096).unwrap();
        assert_eq!(sizing.max_records, 20971);
        assert_eq!(sizing.n_chunks, 1);
    }

    #[test]
    fn default_snaplen_in_a_two_mebibyte_budget() {
        let sizing = sizes(9230, 2 * 1024 * 1024).unwrap();
        assert_eq!(sizing.max_records, 227);
        assert_eq!(sizing.n_chunks, 1);
        assert_eq!(sizing.n_slots(), 227);
    }

    #[test]
    fn oversized_snaplen_still_yields_one_record() {
        let sizing = sizes(3 * 1024 * 1024, 128 * 1024 * 1024).unwrap();
        assert_eq!(sizing.max_records, 1);
        assert_eq!(sizing.n_chunks, 42);
    }

    #[test]
    fn default_options_geometry() {
        let sizing = sizes(9230, 128 * 1024 * 1024).unwrap();
        assert_eq!(sizing.max_records, 227);
        assert_eq!(sizing.n_chunks, 64);
    }

    #[test]
    fn slot_counter_overflow_is_rejected() {
        assert_eq!(sizes(1, 1 << 43), Err(SizingError::TooManySlots));
    }
}
