// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Device holder allocation.
//!
//! When no node has a slice with room, a holder Deployment claims one whole
//! `<vendor>/<model>` device. Its pod registers the device's slices with the
//! node's agent once running; the node it lands on is nominated for the
//! next scheduling pass.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, ObjectFieldSelector, Pod, PodSpec, PodTemplateSpec,
    ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use tokio_util::sync::CancellationToken;

use sharedev_cluster_client::{ClusterClient, PodWatchEvent, PodWatchStream};
use sharedev_common::config::SchedulerConfig;
use sharedev_common::constants::{
    ENV_HOST_IP, HOLDER_CONTAINER_NAME, HOLDER_NAME_PREFIX, HOLDER_SELECTOR_LABEL,
    HOST_IP_FIELD_PATH, MAX_NAME_LENGTH,
};
use sharedev_common::status::{ShareDevError, ShareDevResult};
use sharedev_util::time::current_time_secs;

use crate::framework::until_cancelled;

const POD_RUNNING: &str = "Running";

/// Process-wide sequence that keeps holder names unique within a second.
static HOLDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Lowercase, map anything outside `[a-z0-9-]` to `-`, trim `-` at the ends.
fn sanitize(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches('-').to_string()
}

/// `allocator-<vendor>-<model>-<secs>-<seq>` as a DNS-1123 label. The
/// vendor/model part is shortened first when the name would exceed 63
/// characters.
pub fn holder_name(vendor: &str, model: &str, unix_secs: u64, seq: u64) -> String {
    let suffix = format!("{unix_secs}-{seq}");
    let room = MAX_NAME_LENGTH.saturating_sub(HOLDER_NAME_PREFIX.len() + suffix.len() + 2);
    let class = sanitize(&format!("{vendor}-{model}"));
    let class: String = class.chars().take(room).collect();
    let class = class.trim_end_matches('-');
    if class.is_empty() {
        format!("{HOLDER_NAME_PREFIX}-{suffix}")
    } else {
        format!("{HOLDER_NAME_PREFIX}-{class}-{suffix}")
    }
}

/// Single-replica Deployment requesting one whole `<vendor>/<model>` device.
pub fn build_holder_deployment(
    name: &str,
    namespace: &str,
    image: &str,
    vendor: &str,
    model: &str,
) -> Deployment {
    let labels = BTreeMap::from([(HOLDER_SELECTOR_LABEL.to_string(), name.to_string())]);
    let limits = BTreeMap::from([(format!("{vendor}/{model}"), Quantity("1".to_string()))]);

    let host_ip = EnvVar {
        name: ENV_HOST_IP.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: None,
                field_path: HOST_IP_FIELD_PATH.to_string(),
            }),
            ..Default::default()
        }),
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: HOLDER_CONTAINER_NAME.to_string(),
                        image: Some(image.to_string()),
                        resources: Some(ResourceRequirements {
                            limits: Some(limits),
                            ..Default::default()
                        }),
                        env: Some(vec![host_ip]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn is_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == POD_RUNNING)
}

/// Wait on the watch until a holder pod is running; return its node.
async fn wait_for_running(holder: &str, events: &mut PodWatchStream) -> ShareDevResult<String> {
    while let Some(event) = events.next().await {
        match event {
            PodWatchEvent::Applied(pod) if is_running(&pod) => {
                return pod
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.node_name.clone())
                    .filter(|node| !node.is_empty())
                    .ok_or_else(|| {
                        ShareDevError::watch_protocol_error(format!(
                            "holder {holder} pod is running without a node"
                        ))
                    });
            }
            PodWatchEvent::Applied(_) | PodWatchEvent::Deleted(_) => {}
            PodWatchEvent::Unexpected(what) => {
                return Err(ShareDevError::watch_protocol_error(format!(
                    "holder {holder} watch: {what}"
                )));
            }
        }
    }
    Err(ShareDevError::watch_protocol_error(format!(
        "holder {holder} watch closed"
    )))
}

/// Submits holders and waits for them to start.
pub struct HolderAllocator {
    cluster: Arc<dyn ClusterClient>,
    namespace: String,
    image: String,
    start_timeout: Duration,
}

impl HolderAllocator {
    pub fn new(cluster: Arc<dyn ClusterClient>, config: &SchedulerConfig) -> Self {
        Self {
            cluster,
            namespace: config.holder_namespace.clone(),
            image: config.holder_image.clone(),
            start_timeout: config.holder_start_timeout(),
        }
    }

    pub fn next_holder_name(&self, vendor: &str, model: &str) -> String {
        let seq = HOLDER_SEQ.fetch_add(1, Ordering::Relaxed);
        holder_name(vendor, model, current_time_secs(), seq)
    }

    /// Create a holder for one `<vendor>/<model>` device and return the node
    /// its pod runs on. `start_timeout` bounds the whole exchange, watch and
    /// submission included, and `cancel` aborts it at any step.
    pub async fn allocate_holder(
        &self,
        vendor: &str,
        model: &str,
        cancel: &CancellationToken,
    ) -> ShareDevResult<String> {
        let name = self.next_holder_name(vendor, model);
        let submit = self.submit_and_wait(&name, vendor, model);
        let attempt = async {
            tokio::time::timeout(self.start_timeout, submit)
                .await
                .unwrap_or_else(|_| {
                    Err(ShareDevError::holder_did_not_start(format!(
                        "holder {name} not running after {:?}",
                        self.start_timeout
                    )))
                })
        };
        let result = until_cancelled(cancel, &format!("allocating holder {name}"), attempt).await;

        match &result {
            Ok(node) => tracing::info!(holder = %name, node = %node, "device holder running"),
            Err(e) => tracing::warn!(
                holder = %name,
                error = %e,
                holder_failure = e.is_holder_failure(),
                "device holder allocation failed"
            ),
        }
        result
    }

    async fn submit_and_wait(
        &self,
        name: &str,
        vendor: &str,
        model: &str,
    ) -> ShareDevResult<String> {
        let selector = format!("{HOLDER_SELECTOR_LABEL}={name}");

        // Watch first so the Running transition cannot slip past.
        let mut events = self
            .cluster
            .watch_pods(&self.namespace, &selector)
            .await
            .map_err(|e| {
                ShareDevError::watch_protocol_error(format!(
                    "cannot watch holder {name}: {}",
                    e.message
                ))
            })?;

        let deployment = build_holder_deployment(name, &self.namespace, &self.image, vendor, model);
        self.cluster
            .create_deployment(&self.namespace, &deployment)
            .await
            .map_err(|e| {
                ShareDevError::holder_submission_failed(format!("{name}: {}", e.message))
            })?;
        tracing::info!(holder = %name, namespace = %self.namespace, vendor, model, "submitted device holder");

        wait_for_running(name, &mut events).await
    }
}
