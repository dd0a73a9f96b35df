// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Fractional-device scheduler plugin.
//!
//! Parses a workload's share request, collects per-node free slices from the
//! device manager agents, filters and scores nodes by worst fit, reserves a
//! slice on the winner and rewrites the workload to run there. When no node
//! has room it asks the holder allocator to bring up a whole device.

pub mod allocator;
pub mod cycle;
pub mod fit;
pub mod framework;
pub mod plugin;
pub mod rewriter;
pub mod state;
pub mod workload;

pub use allocator::HolderAllocator;
pub use cycle::{CycleOutcome, CycleRunner};
pub use plugin::ShareDevPlugin;
pub use state::{NodeInventory, ShareDevState};
pub use sharedev_util::logging::init_sharedev_logging;
