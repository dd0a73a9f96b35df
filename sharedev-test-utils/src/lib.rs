// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Shared test helpers for sharedev crates.

pub mod builders;
pub mod fake_agent;
pub mod fake_cluster;

pub use builders::{holder_pod, make_node, make_pod, share_labels};
pub use fake_agent::{AgentCall, FakeDeviceManager};
pub use fake_cluster::{ClusterCall, FakeClusterClient};

/// Initialize tracing for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}
