// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Network address types shared across the capture workspace.

pub mod endpoint;
pub mod eth;

pub use endpoint::{Endpoint, EndpointError};
pub use eth::MacAddress;
