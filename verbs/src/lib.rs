// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Safe wrappers over the verbs layer.
//!
//! Each wrapper owns exactly one verbs object through a [`core::ptr::NonNull`]
//! and releases it on drop. Teardown order matters and is not encoded in the
//! type system: memory regions before the protection domain, flows and the
//! queue pair before the completion queue, everything before the connection
//! id and its event channel. Holders get that for free by declaring the
//! wrappers in reverse teardown order.

pub mod cm;
pub mod cq;
pub mod flow;
pub mod mr;
pub mod pd;
pub mod qp;

pub use cm::{BindError, ChannelError, CmId, CmIdError, EventChannel};
pub use cq::{Completion, CompletionQueue, CqError, PollError};
pub use flow::{Flow, FlowError};
pub use mr::{MemoryRegion, RegisterError};
pub use pd::{PdError, ProtectionDomain};
pub use qp::{ModifyError, PortNumber, PostRecvError, QpCreateError, QueuePair};
