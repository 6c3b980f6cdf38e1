// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Thread-to-CPU pinning.

use nix::errno::Errno;
use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

/// Pin the calling thread to one CPU.
pub fn pin_current_thread(cpu: usize) -> Result<(), Errno> {
    let mut set = CpuSet::new();
    set.set(cpu)?;
    sched_setaffinity(Pid::from_raw(0), &set)
}
