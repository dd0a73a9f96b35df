// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Async trait for the cluster API surface the scheduler needs.

use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;

use sharedev_common::status::ShareDevResult;

/// One item from a pod watch.
#[derive(Debug, Clone)]
pub enum PodWatchEvent {
    /// A pod matching the selector was listed, added or modified.
    Applied(Box<Pod>),
    /// A pod matching the selector was deleted.
    Deleted(Box<Pod>),
    /// The watch yielded something other than a pod (an error frame,
    /// a protocol violation).
    Unexpected(String),
}

pub type PodWatchStream = BoxStream<'static, PodWatchEvent>;

/// Cluster operations used by Reserve and the holder allocator.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// Delete a pod by name.
    async fn delete_pod(&self, namespace: &str, name: &str) -> ShareDevResult<()>;

    /// Create a pod in `namespace`.
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ShareDevResult<()>;

    /// Submit a holder Deployment.
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment)
        -> ShareDevResult<()>;

    /// Watch pods matching `label_selector`. The stream ends when dropped.
    async fn watch_pods(&self, namespace: &str, label_selector: &str)
        -> ShareDevResult<PodWatchStream>;
}
