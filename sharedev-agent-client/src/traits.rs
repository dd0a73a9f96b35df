// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Async trait for the device manager agent client.

use sharedev_common::quota::{FreeSlice, ShareRequest};
use sharedev_common::status::ShareDevResult;
use tokio_util::sync::CancellationToken;

/// Async trait for the three device manager operations.
///
/// Every call addresses the agent on one node by IP and carries its own
/// deadline. Failures are reported as `Dial`, `DeadlineExceeded`, `Rpc` or
/// `Cancelled` errors.
#[async_trait::async_trait]
pub trait DeviceManagerClient: Send + Sync {
    /// Free slices of devices matching vendor and model on the node.
    async fn get_available_devices(
        &self,
        node_ip: &str,
        vendor: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> ShareDevResult<Vec<FreeSlice>>;

    /// Reserve `request`'s quota on `device_id` for the workload.
    async fn reserve_pod_quota(
        &self,
        node_ip: &str,
        device_id: &str,
        request: &ShareRequest,
        cancel: &CancellationToken,
    ) -> ShareDevResult<()>;

    /// Release a reservation. Takes no cancellation token: compensation has
    /// to run even when the cycle was cancelled.
    async fn unreserve_pod_quota(
        &self,
        node_ip: &str,
        device_id: &str,
        workload_id: &str,
    ) -> ShareDevResult<()>;
}
