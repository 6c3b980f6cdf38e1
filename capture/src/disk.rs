// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! The disk thread: pcap emission and chunk recycling.

use pcap_io::{FileHeader, Writer, WriterError};
use verbs::{PostRecvError, QueuePair};

use crate::chunk::Chunk;
use crate::ring::Ring;
use crate::signal;

/// Error type for fatal disk-thread failures.
#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("failed to pin disk thread to CPU {cpu}: {errno}")]
    Pin { cpu: usize, errno: nix::errno::Errno },
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    Rearm(#[from] PostRecvError),
}

/// Drain the `ready` ring into the pcap stream until it stops.
///
/// Full chunks go back to `free` re-armed; a short chunk is the run's last
/// and still has work requests outstanding past its fill, so re-posting its
/// chain would double-post. On any failure the stop flag is raised and the
/// `free` ring stopped so the network thread cannot block on an empty ring
/// whose refill path is gone.
pub fn run(
    ready: &Ring<Chunk>,
    free: &Ring<Chunk>,
    qp: &QueuePair,
    writer: Writer,
    snaplen: u32,
    cpu: Option<usize>,
) -> Result<(), DiskError> {
    let result = write_loop(ready, free, qp, writer, snaplen, cpu);
    if result.is_err() {
        signal::request_stop();
        free.stop();
    }
    result
}

fn write_loop(
    ready: &Ring<Chunk>,
    free: &Ring<Chunk>,
    qp: &QueuePair,
    mut writer: Writer,
    snaplen: u32,
    cpu: Option<usize>,
) -> Result<(), DiskError> {
    if let Some(cpu) = cpu {
        crate::affinity::pin_current_thread(cpu).map_err(|errno| DiskError::Pin { cpu, errno })?;
    }
    writer.write(FileHeader::new(snaplen).as_bytes())?;
    loop {
        let Ok(mut chunk) = ready.pop() else {
            free.stop();
            writer.close()?;
            return Ok(());
        };
        for iov in chunk.iov() {
            // SAFETY: each entry points at this chunk's slot headers or
            // arena, both alive for the duration of the borrow.
            let bytes =
                unsafe { std::slice::from_raw_parts(iov.iov_base.cast_const().cast::<u8>(), iov.iov_len) };
            writer.write(bytes)?;
        }
        if chunk.is_full() {
            chunk.reset_and_post(qp)?;
            // A stopped free ring means shutdown is under way; the chunk is
            // simply retired.
            let _ = free.push(chunk);
        }
    }
}
