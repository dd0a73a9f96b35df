// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Real device manager client backed by tonic gRPC stubs.
//!
//! Every call dials the agent, issues exactly one request and drops the
//! channel. Connections are not pooled.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};

use sharedev_common::config::SchedulerConfig;
use sharedev_common::constants::AGENT_PORT;
use sharedev_common::quota::{FreeSlice, ShareRequest};
use sharedev_common::status::{ShareDevError, ShareDevResult};
use sharedev_proto::devicemanager as pb;
use sharedev_proto::DeviceManagerClient as AgentStub;

use crate::traits::DeviceManagerClient;

/// Per-operation deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTimeouts {
    pub get_available_devices: Duration,
    pub reserve_pod_quota: Duration,
    pub unreserve_pod_quota: Duration,
}

impl Default for AgentTimeouts {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for AgentTimeouts {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            get_available_devices: config.get_devices_timeout(),
            reserve_pod_quota: config.reserve_timeout(),
            unreserve_pod_quota: config.unreserve_timeout(),
        }
    }
}

/// Dial-per-call client for the device manager agent.
#[derive(Debug, Clone)]
pub struct DeviceManagerRpcClient {
    port: u16,
    timeouts: AgentTimeouts,
}

impl Default for DeviceManagerRpcClient {
    fn default() -> Self {
        Self::new(AGENT_PORT, AgentTimeouts::default())
    }
}

impl DeviceManagerRpcClient {
    pub fn new(port: u16, timeouts: AgentTimeouts) -> Self {
        Self { port, timeouts }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.agent_port, AgentTimeouts::from(config))
    }

    pub fn timeouts(&self) -> &AgentTimeouts {
        &self.timeouts
    }

    /// `<ip>:<port>`, bracketing IPv6 literals.
    fn agent_address(&self, node_ip: &str) -> String {
        match node_ip.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{node_ip}:{}", self.port),
        }
    }

    /// Dial, run one call, drop the channel. The whole exchange, dial
    /// included, is bounded by `deadline`.
    async fn call<T, F, Fut>(
        &self,
        op: &'static str,
        node_ip: &str,
        deadline: Duration,
        cancel: Option<&CancellationToken>,
        f: F,
    ) -> ShareDevResult<T>
    where
        F: FnOnce(AgentStub<Channel>) -> Fut,
        Fut: Future<Output = Result<T, tonic::Status>>,
    {
        let address = self.agent_address(node_ip);
        let expires = Instant::now() + deadline;

        let exchange = async {
            let endpoint = match Endpoint::from_shared(format!("http://{address}")) {
                Ok(endpoint) => endpoint.connect_timeout(deadline),
                Err(e) => {
                    return Err(ShareDevError::dial(format!(
                        "invalid agent address {address}: {e}"
                    )))
                }
            };

            let channel = match tokio::time::timeout_at(expires, endpoint.connect()).await {
                Ok(Ok(channel)) => channel,
                Ok(Err(e)) => {
                    return Err(ShareDevError::dial(format!("did not connect to {address}: {e}")))
                }
                Err(_) => {
                    return Err(ShareDevError::dial(format!(
                        "did not connect to {address} within {deadline:?}"
                    )))
                }
            };

            match tokio::time::timeout_at(expires, f(AgentStub::new(channel))).await {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(status)) => Err(status_to_error(op, &address, status)),
                Err(_) => Err(ShareDevError::deadline_exceeded(format!(
                    "{op} on {address} exceeded {deadline:?}"
                ))),
            }
        };

        let result = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        Err(ShareDevError::cancelled(format!("{op} on {address} cancelled")))
                    }
                    r = exchange => r,
                }
            }
            None => exchange.await,
        };

        match &result {
            Ok(_) => tracing::debug!(op, agent = %address, "agent call succeeded"),
            Err(e) => tracing::warn!(op, agent = %address, error = %e, "agent call failed"),
        }
        result
    }
}

fn status_to_error(op: &str, address: &str, status: tonic::Status) -> ShareDevError {
    match status.code() {
        tonic::Code::DeadlineExceeded => ShareDevError::deadline_exceeded(format!(
            "{op} on {address}: {}",
            status.message()
        )),
        code => ShareDevError::rpc(
            format!("{op} on {address}: {}", status.message()),
            code as i32,
        ),
    }
}

fn with_deadline<T>(message: T, deadline: Duration) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    request.set_timeout(deadline);
    request
}

#[async_trait::async_trait]
impl DeviceManagerClient for DeviceManagerRpcClient {
    async fn get_available_devices(
        &self,
        node_ip: &str,
        vendor: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> ShareDevResult<Vec<FreeSlice>> {
        let deadline = self.timeouts.get_available_devices;
        let message = pb::GetAvailableDevicesRequest {
            vendor: vendor.to_string(),
            model: model.to_string(),
        };
        let reply = self
            .call("GetAvailableDevices", node_ip, deadline, Some(cancel), |mut stub| async move {
                stub.get_available_devices(with_deadline(message, deadline))
                    .await
                    .map(|resp| resp.into_inner())
            })
            .await?;

        Ok(reply
            .free
            .into_iter()
            .map(|free| FreeSlice::new(free.device_id, free.requests, free.memory))
            .collect())
    }

    async fn reserve_pod_quota(
        &self,
        node_ip: &str,
        device_id: &str,
        request: &ShareRequest,
        cancel: &CancellationToken,
    ) -> ShareDevResult<()> {
        let deadline = self.timeouts.reserve_pod_quota;
        let message = pb::ReservePodQuotaRequest {
            device_id: device_id.to_string(),
            pod_id: request.workload_id.clone(),
            requests: request.requests,
            memory: request.memory,
            limit: request.limits,
        };
        self.call("ReservePodQuota", node_ip, deadline, Some(cancel), |mut stub| async move {
            stub.reserve_pod_quota(with_deadline(message, deadline))
                .await
                .map(|_| ())
        })
        .await
    }

    async fn unreserve_pod_quota(
        &self,
        node_ip: &str,
        device_id: &str,
        workload_id: &str,
    ) -> ShareDevResult<()> {
        let deadline = self.timeouts.unreserve_pod_quota;
        let message = pb::UnreservePodQuotaRequest {
            device_id: device_id.to_string(),
            pod_id: workload_id.to_string(),
        };
        self.call("UnreservePodQuota", node_ip, deadline, None, |mut stub| async move {
            stub.unreserve_pod_quota(with_deadline(message, deadline))
                .await
                .map(|_| ())
        })
        .await
    }
}
