// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! The network thread: completion polling and chunk filling.

use tracing::{debug, warn};

use verbs::{Completion, CompletionQueue, PollError};

use crate::chunk::{Chunk, SlotOrderError};
use crate::ring::Ring;
use crate::signal;
use crate::stats::Stats;

/// Error type for fatal network-thread failures.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("failed to pin network thread to CPU {cpu}: {errno}")]
    Pin { cpu: usize, errno: nix::errno::Errno },
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    SlotOrder(#[from] SlotOrderError),
}

/// Fill chunks from the completion queue until stop or a fatal error.
///
/// Whatever happens, the `ready` ring ends stopped so the disk thread drains
/// and exits; on error the global stop flag is raised first so the peer never
/// re-arms into a dead pipeline.
pub fn run(
    cq: &CompletionQueue,
    free: &Ring<Chunk>,
    ready: &Ring<Chunk>,
    max_records: u32,
    stats: &mut Stats,
    stamp_time: bool,
    cpu: Option<usize>,
) -> Result<(), NetworkError> {
    let result = pin_and_poll(cq, free, ready, max_records, stats, stamp_time, cpu);
    if result.is_err() {
        signal::request_stop();
    }
    ready.stop();
    result
}

fn pin_and_poll(
    cq: &CompletionQueue,
    free: &Ring<Chunk>,
    ready: &Ring<Chunk>,
    max_records: u32,
    stats: &mut Stats,
    stamp_time: bool,
    cpu: Option<usize>,
) -> Result<(), NetworkError> {
    if let Some(cpu) = cpu {
        crate::affinity::pin_current_thread(cpu).map_err(|errno| NetworkError::Pin { cpu, errno })?;
    }
    poll_loop(cq, free, ready, max_records, stats, stamp_time)
}

fn poll_loop(
    cq: &CompletionQueue,
    free: &Ring<Chunk>,
    ready: &Ring<Chunk>,
    max_records: u32,
    stats: &mut Stats,
    stamp_time: bool,
) -> Result<(), NetworkError> {
    let mut wc = vec![Completion::empty(); max_records as usize];
    while !signal::stop_requested() {
        let Ok(mut chunk) = free.pop() else {
            break;
        };
        let mut expect = max_records as usize;
        while !signal::stop_requested() && expect > 0 {
            // Poll at most `expect` entries: the queue is shared by every
            // chunk's work requests and anything past this chunk's remainder
            // belongs to the next one.
            let n = cq.poll(&mut wc[..expect])?;
            if n == 0 {
                continue;
            }
            let ts = if stamp_time { now() } else { (0, 0) };
            for completion in &wc[..n] {
                if completion.is_success() {
                    chunk.complete(completion.wr_id(), completion.byte_len(), ts)?;
                    stats.packets += 1;
                    stats.bytes += u64::from(completion.byte_len());
                } else {
                    warn!(
                        "failed WR {}: {:?} (vendor_err: {})",
                        completion.wr_id(),
                        completion.status(),
                        completion.vendor_err()
                    );
                    stats.errors += 1;
                }
            }
            expect -= n;
        }
        // A stop (or a chunk's worth of failed completions) can leave zero
        // records; there is nothing worth emitting then.
        if chunk.n_records() == 0 {
            continue;
        }
        debug!(
            "chunk filled: {} records, {} bytes",
            chunk.n_records(),
            chunk.n_bytes()
        );
        if ready.push(chunk).is_err() {
            break;
        }
    }
    Ok(())
}

/// Wall-clock stamp shared by every record in one poll batch.
fn now() -> (u32, u32) {
    match nix::time::clock_gettime(nix::time::ClockId::CLOCK_REALTIME) {
        Ok(ts) => (ts.tv_sec() as u32, (ts.tv_nsec() / 1000) as u32),
        Err(_) => (0, 0),
    }
}
