// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! In-memory cluster API with scripted pod watches.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use parking_lot::Mutex;

use sharedev_cluster_client::{ClusterClient, PodWatchEvent, PodWatchStream};
use sharedev_common::status::{ShareDevError, ShareDevResult};

/// A recorded cluster call.
#[derive(Debug, Clone)]
pub enum ClusterCall {
    DeletePod { namespace: String, name: String },
    CreatePod { namespace: String, pod: Box<Pod> },
    CreateDeployment {
        namespace: String,
        deployment: Box<Deployment>,
    },
    WatchPods {
        namespace: String,
        label_selector: String,
    },
}

#[derive(Default)]
struct Inner {
    watch_events: Vec<PodWatchEvent>,
    close_watch: bool,
    fail_delete: bool,
    fail_create_pod: bool,
    fail_create_deployment: bool,
    fail_watch: bool,
    hang_create_pod: bool,
    hang_create_deployment: bool,
    calls: Vec<ClusterCall>,
}

/// Fake cluster. Every watch replays the scripted events and then stays
/// open, or ends if `close_watch_after_events` was set.
#[derive(Clone, Default)]
pub struct FakeClusterClient {
    inner: Arc<Mutex<Inner>>,
}

impl FakeClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_watch_event(&self, event: PodWatchEvent) {
        self.inner.lock().watch_events.push(event);
    }

    pub fn close_watch_after_events(&self) {
        self.inner.lock().close_watch = true;
    }

    pub fn fail_delete(&self) {
        self.inner.lock().fail_delete = true;
    }

    pub fn fail_create_pod(&self) {
        self.inner.lock().fail_create_pod = true;
    }

    pub fn fail_create_deployment(&self) {
        self.inner.lock().fail_create_deployment = true;
    }

    pub fn fail_watch(&self) {
        self.inner.lock().fail_watch = true;
    }

    /// Pod creation is recorded and then never completes.
    pub fn hang_create_pod(&self) {
        self.inner.lock().hang_create_pod = true;
    }

    /// Deployment creation is recorded and then never completes.
    pub fn hang_create_deployment(&self) {
        self.inner.lock().hang_create_deployment = true;
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.inner.lock().calls.clone()
    }

    pub fn created_pods(&self) -> Vec<Pod> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::CreatePod { pod, .. } => Some(*pod),
                _ => None,
            })
            .collect()
    }

    pub fn created_deployments(&self) -> Vec<Deployment> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::CreateDeployment { deployment, .. } => Some(*deployment),
                _ => None,
            })
            .collect()
    }
}

fn injected(what: &str) -> ShareDevError {
    ShareDevError::cluster_api(format!("injected {what} failure"))
}

#[async_trait::async_trait]
impl ClusterClient for FakeClusterClient {
    async fn delete_pod(&self, namespace: &str, name: &str) -> ShareDevResult<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(ClusterCall::DeletePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        if inner.fail_delete {
            return Err(injected("delete"));
        }
        Ok(())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ShareDevResult<()> {
        let hang = {
            let mut inner = self.inner.lock();
            inner.calls.push(ClusterCall::CreatePod {
                namespace: namespace.to_string(),
                pod: Box::new(pod.clone()),
            });
            if inner.fail_create_pod {
                return Err(injected("create pod"));
            }
            inner.hang_create_pod
        };
        if hang {
            future::pending::<()>().await;
        }
        Ok(())
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> ShareDevResult<()> {
        let hang = {
            let mut inner = self.inner.lock();
            inner.calls.push(ClusterCall::CreateDeployment {
                namespace: namespace.to_string(),
                deployment: Box::new(deployment.clone()),
            });
            if inner.fail_create_deployment {
                return Err(injected("create deployment"));
            }
            inner.hang_create_deployment
        };
        if hang {
            future::pending::<()>().await;
        }
        Ok(())
    }

    async fn watch_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> ShareDevResult<PodWatchStream> {
        let mut inner = self.inner.lock();
        inner.calls.push(ClusterCall::WatchPods {
            namespace: namespace.to_string(),
            label_selector: label_selector.to_string(),
        });
        if inner.fail_watch {
            return Err(injected("watch"));
        }
        let scripted = stream::iter(inner.watch_events.clone());
        if inner.close_watch {
            Ok(scripted.boxed())
        } else {
            Ok(scripted.chain(stream::pending()).boxed())
        }
    }
}
