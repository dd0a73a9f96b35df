// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! The share plugin: every extension point of a scheduling cycle.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tokio_util::sync::CancellationToken;

use sharedev_agent_client::DeviceManagerClient;
use sharedev_cluster_client::ClusterClient;
use sharedev_common::config::SchedulerConfig;
use sharedev_common::constants::{PLUGIN_NAME, SHARE_DEV_STATE_KEY};
use sharedev_common::status::{ShareDevError, ShareDevResult};

use crate::allocator::HolderAllocator;
use crate::fit::{best_fit, fits, normalize_scores};
use crate::framework::{
    CycleState, FilterPlugin, NodeInfo, NodeScore, NodeToStatusMap, Plugin, PostFilterPlugin,
    PostFilterResult, PreFilterPlugin, ReservePlugin, ScorePlugin, Status, until_cancelled,
};
use crate::rewriter::rewrite_workload;
use crate::state::ShareDevState;
use crate::workload::{pod_key, pod_name, pod_namespace, share_request};

pub struct ShareDevPlugin {
    agent: Arc<dyn DeviceManagerClient>,
    cluster: Arc<dyn ClusterClient>,
    allocator: HolderAllocator,
}

impl ShareDevPlugin {
    pub fn new(
        agent: Arc<dyn DeviceManagerClient>,
        cluster: Arc<dyn ClusterClient>,
        config: &SchedulerConfig,
    ) -> Self {
        let allocator = HolderAllocator::new(cluster.clone(), config);
        Self {
            agent,
            cluster,
            allocator,
        }
    }

    /// Delete the original workload, then create its rewritten copy under
    /// the same name. Either call is abandoned once `cancel` fires.
    async fn replace_workload(
        &self,
        current: &Pod,
        replacement: &Pod,
        cancel: &CancellationToken,
    ) -> ShareDevResult<()> {
        let namespace = pod_namespace(current);
        let name = pod_name(current);
        until_cancelled(
            cancel,
            &format!("deleting workload {namespace}/{name}"),
            self.cluster.delete_pod(namespace, name),
        )
        .await?;
        until_cancelled(
            cancel,
            &format!("creating workload {namespace}/{name}"),
            self.cluster.create_pod(namespace, replacement),
        )
        .await
    }
}

impl Plugin for ShareDevPlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }
}

#[async_trait::async_trait]
impl PreFilterPlugin for ShareDevPlugin {
    async fn pre_filter(&self, state: &CycleState, pod: &Pod) -> Status {
        if state.contains(SHARE_DEV_STATE_KEY) {
            return Status::success();
        }
        match share_request(pod) {
            Ok(request) => {
                tracing::debug!(
                    pod = %pod_key(pod),
                    device = %request.device_resource_name(),
                    requests = request.requests,
                    memory = request.memory,
                    "parsed share request"
                );
                state.write(SHARE_DEV_STATE_KEY, Arc::new(ShareDevState::new(request)));
                Status::success()
            }
            Err(e) => {
                tracing::debug!(pod = %pod_key(pod), error = %e, "rejecting workload");
                Status::unschedulable(e.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl FilterPlugin for ShareDevPlugin {
    async fn filter(
        &self,
        state: &CycleState,
        pod: &Pod,
        node: &NodeInfo,
        cancel: &CancellationToken,
    ) -> Status {
        let share = match ShareDevState::read_from(state) {
            Ok(share) => share,
            Err(e) => return e.into(),
        };
        let node_name = node.name();
        let Some(node_ip) = node.internal_ip() else {
            return ShareDevError::missing_node_address(format!(
                "node {node_name} has no InternalIP"
            ))
            .into();
        };

        let request = share.request();
        let slices = match self
            .agent
            .get_available_devices(node_ip, &request.vendor, &request.model, cancel)
            .await
        {
            Ok(slices) => slices,
            Err(e) => {
                tracing::warn!(pod = %pod_key(pod), node = node_name, error = %e, "cannot query device manager");
                return e.into();
            }
        };

        let any_fit = slices.iter().any(|slice| fits(request, slice));
        let num_slices = slices.len();
        share.record_inventory(node_name, node_ip, slices);
        tracing::debug!(pod = %pod_key(pod), node = node_name, num_slices, any_fit, "filtered node");

        if num_slices == 0 {
            Status::unschedulable(format!(
                "node {node_name} has no {} slices",
                request.device_resource_name()
            ))
        } else if any_fit {
            Status::success()
        } else {
            Status::unresolvable(format!(
                "no {} slice on node {node_name} fits requests={} memory={}",
                request.device_resource_name(),
                request.requests,
                request.memory
            ))
        }
    }
}

#[async_trait::async_trait]
impl PostFilterPlugin for ShareDevPlugin {
    async fn post_filter(
        &self,
        state: &CycleState,
        pod: &Pod,
        filtered: &NodeToStatusMap,
        cancel: &CancellationToken,
    ) -> Result<PostFilterResult, Status> {
        let share = ShareDevState::read_from(state).map_err(Status::from)?;
        let request = share.request();
        tracing::info!(
            pod = %pod_key(pod),
            device = %request.device_resource_name(),
            num_filtered = filtered.len(),
            num_inventoried = share.num_nodes(),
            "no slice fits, allocating a device holder"
        );
        let node = self
            .allocator
            .allocate_holder(&request.vendor, &request.model, cancel)
            .await
            .map_err(Status::from)?;
        Ok(PostFilterResult {
            nominated_node_name: node,
        })
    }
}

#[async_trait::async_trait]
impl ScorePlugin for ShareDevPlugin {
    async fn score(&self, state: &CycleState, pod: &Pod, node_name: &str) -> Result<i64, Status> {
        let share = ShareDevState::read_from(state).map_err(Status::from)?;
        let inventory = share.inventory(node_name).ok_or_else(|| {
            Status::from(ShareDevError::state_missing(format!(
                "no inventory recorded for node {node_name}"
            )))
        })?;
        let (score, slice) = best_fit(share.request(), &inventory.slices);
        tracing::debug!(
            pod = %pod_key(pod),
            node = node_name,
            score,
            device_id = slice.map(|s| s.device_id.as_str()).unwrap_or_default(),
            "scored node"
        );
        Ok(score)
    }

    fn normalize_score(&self, _state: &CycleState, _pod: &Pod, scores: &mut [NodeScore]) -> Status {
        normalize_scores(scores);
        Status::success()
    }
}

#[async_trait::async_trait]
impl ReservePlugin for ShareDevPlugin {
    async fn reserve(
        &self,
        state: &CycleState,
        pod: &Pod,
        node_name: &str,
        cancel: &CancellationToken,
    ) -> Status {
        let share = match ShareDevState::read_from(state) {
            Ok(share) => share,
            Err(e) => return e.into(),
        };
        let Some(inventory) = share.inventory(node_name) else {
            return ShareDevError::state_missing(format!(
                "no inventory recorded for node {node_name}"
            ))
            .into();
        };
        let request = share.request();
        let Some(slice) = best_fit(request, &inventory.slices).1 else {
            return ShareDevError::no_fit_on_node(format!(
                "no slice on node {node_name} fits the request"
            ))
            .into();
        };
        let device_id = slice.device_id.clone();

        if let Err(e) = self
            .agent
            .reserve_pod_quota(&inventory.node_ip, &device_id, request, cancel)
            .await
        {
            tracing::warn!(pod = %pod_key(pod), node = node_name, device_id = %device_id, error = %e, "reserve failed");
            return e.into();
        }
        share.set_reserved_device(device_id.clone());

        let rewritten = rewrite_workload(pod, node_name, &device_id, &inventory.node_ip);
        if let Err(e) = self.replace_workload(pod, &rewritten, cancel).await {
            tracing::warn!(pod = %pod_key(pod), node = node_name, error = %e, "replacing workload failed");
            return e.into();
        }

        tracing::info!(pod = %pod_key(pod), node = node_name, device_id = %device_id, "reserved device slice");
        Status::success()
    }

    async fn unreserve(&self, state: &CycleState, pod: &Pod, node_name: &str) {
        let Ok(share) = ShareDevState::read_from(state) else {
            return;
        };
        let Some(device_id) = share.take_reserved_device() else {
            return;
        };
        let Some(node_ip) = share.node_ip(node_name) else {
            tracing::warn!(pod = %pod_key(pod), node = node_name, device_id = %device_id, "no address to unreserve on");
            return;
        };
        let workload_id = &share.request().workload_id;
        match self
            .agent
            .unreserve_pod_quota(&node_ip, &device_id, workload_id)
            .await
        {
            Ok(()) => {
                tracing::info!(pod = %pod_key(pod), node = node_name, device_id = %device_id, "released device slice")
            }
            Err(e) => {
                tracing::warn!(pod = %pod_key(pod), node = node_name, device_id = %device_id, error = %e, "unreserve failed")
            }
        }
    }
}
