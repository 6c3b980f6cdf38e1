// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Run totals.
//!
//! Written only by the network thread, read only after it has finished, so
//! plain integers are enough.

use std::fmt::{self, Display};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub packets: u64,
    pub bytes: u64,
    pub errors: u64,
}

impl Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packets captured ({} bytes)\n{} errors",
            self.packets, self.bytes, self.errors
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn displays_the_run_summary() {
        let stats = Stats {
            packets: 3,
            bytes: 310,
            errors: 0,
        };
        assert_eq!(stats.to_string(), "3 packets captured (310 bytes)\n0 errors");
    }
}
