// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fish-drivers: the `Driver` capability contract, the in-tree `test`
//! reference driver, and the registry of configured instances
//! (`spec.md` §4.2).

mod driver;
mod error;
mod registry;
mod test_driver;

pub use driver::{Driver, DriverStatus};
pub use error::DriverError;
pub use registry::DriverRegistry;
pub use test_driver::{TestDriver, TestDriverConfig};
