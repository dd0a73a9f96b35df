// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! In-memory device manager that records every call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use sharedev_agent_client::DeviceManagerClient;
use sharedev_common::quota::{FreeSlice, ShareRequest};
use sharedev_common::status::{ShareDevError, ShareDevResult};

/// A recorded agent call.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCall {
    GetAvailableDevices {
        node_ip: String,
        vendor: String,
        model: String,
    },
    ReservePodQuota {
        node_ip: String,
        device_id: String,
        workload_id: String,
        requests: f64,
        memory: f64,
        limit: f64,
    },
    UnreservePodQuota {
        node_ip: String,
        device_id: String,
        workload_id: String,
    },
}

#[derive(Default)]
struct Inner {
    inventories: HashMap<String, Vec<FreeSlice>>,
    unreachable: HashSet<String>,
    reserve_error: Option<ShareDevError>,
    unreserve_error: Option<ShareDevError>,
    latency: Option<Duration>,
    calls: Vec<AgentCall>,
}

/// Fake agent keyed by node IP. Unknown IPs report no devices.
#[derive(Clone, Default)]
pub struct FakeDeviceManager {
    inner: Arc<Mutex<Inner>>,
}

impl FakeDeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_inventory(&self, node_ip: &str, slices: Vec<FreeSlice>) {
        self.inner
            .lock()
            .inventories
            .insert(node_ip.to_string(), slices);
    }

    /// Calls to `node_ip` fail with a dial error.
    pub fn set_unreachable(&self, node_ip: &str) {
        self.inner.lock().unreachable.insert(node_ip.to_string());
    }

    pub fn fail_reserve_with(&self, err: ShareDevError) {
        self.inner.lock().reserve_error = Some(err);
    }

    pub fn fail_unreserve_with(&self, err: ShareDevError) {
        self.inner.lock().unreserve_error = Some(err);
    }

    /// Delay every call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = Some(latency);
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.inner.lock().calls.clone()
    }

    pub fn reserve_calls(&self) -> Vec<AgentCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, AgentCall::ReservePodQuota { .. }))
            .collect()
    }

    pub fn unreserve_calls(&self) -> Vec<AgentCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, AgentCall::UnreservePodQuota { .. }))
            .collect()
    }

    fn record(&self, call: AgentCall, node_ip: &str) -> ShareDevResult<Option<Duration>> {
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        if inner.unreachable.contains(node_ip) {
            return Err(ShareDevError::dial(format!("did not connect to {node_ip}")));
        }
        Ok(inner.latency)
    }

    async fn wait(latency: Option<Duration>, cancel: Option<&CancellationToken>) -> ShareDevResult<()> {
        let Some(latency) = latency else {
            return match cancel {
                Some(token) if token.is_cancelled() => Err(ShareDevError::cancelled("cancelled")),
                _ => Ok(()),
            };
        };
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ShareDevError::cancelled("cancelled")),
                _ = tokio::time::sleep(latency) => Ok(()),
            },
            None => {
                tokio::time::sleep(latency).await;
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl DeviceManagerClient for FakeDeviceManager {
    async fn get_available_devices(
        &self,
        node_ip: &str,
        vendor: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> ShareDevResult<Vec<FreeSlice>> {
        let latency = self.record(
            AgentCall::GetAvailableDevices {
                node_ip: node_ip.to_string(),
                vendor: vendor.to_string(),
                model: model.to_string(),
            },
            node_ip,
        )?;
        Self::wait(latency, Some(cancel)).await?;
        Ok(self
            .inner
            .lock()
            .inventories
            .get(node_ip)
            .cloned()
            .unwrap_or_default())
    }

    async fn reserve_pod_quota(
        &self,
        node_ip: &str,
        device_id: &str,
        request: &ShareRequest,
        cancel: &CancellationToken,
    ) -> ShareDevResult<()> {
        let latency = self.record(
            AgentCall::ReservePodQuota {
                node_ip: node_ip.to_string(),
                device_id: device_id.to_string(),
                workload_id: request.workload_id.clone(),
                requests: request.requests,
                memory: request.memory,
                limit: request.limits,
            },
            node_ip,
        )?;
        Self::wait(latency, Some(cancel)).await?;
        match self.inner.lock().reserve_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn unreserve_pod_quota(
        &self,
        node_ip: &str,
        device_id: &str,
        workload_id: &str,
    ) -> ShareDevResult<()> {
        let latency = self.record(
            AgentCall::UnreservePodQuota {
                node_ip: node_ip.to_string(),
                device_id: device_id.to_string(),
                workload_id: workload_id.to_string(),
            },
            node_ip,
        )?;
        Self::wait(latency, None).await?;
        match self.inner.lock().unreserve_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
