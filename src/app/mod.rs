// SPDX-License-Identifier: MPL-2.0
//! Application-level wiring shared by the library and the CLI binary.

pub mod logging;
pub mod paths;
