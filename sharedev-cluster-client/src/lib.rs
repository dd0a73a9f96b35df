// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Cluster API access used by the scheduler plugin.
//!
//! Provides:
//! - `ClusterClient` trait: pod delete/create, holder submission, pod watch
//! - `KubeClusterClient`: implementation over `kube::Client`

pub mod kube_client;
pub mod traits;

pub use kube_client::KubeClusterClient;
pub use traits::{ClusterClient, PodWatchEvent, PodWatchStream};
