// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! `ClusterClient` backed by the Kubernetes API server.

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, PostParams};
use kube::runtime::watcher::{self, watcher, Event};
use kube::runtime::WatchStreamExt;

use sharedev_common::status::{ShareDevError, ShareDevResult};

use crate::traits::{ClusterClient, PodWatchEvent, PodWatchStream};

pub struct KubeClusterClient {
    client: kube::Client,
}

impl KubeClusterClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// Build from the in-cluster service account or the local kubeconfig.
    pub async fn try_default() -> ShareDevResult<Self> {
        let client = kube::Client::try_default()
            .await
            .map_err(|e| ShareDevError::cluster_api(format!("failed to build client: {e}")))?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

const HTTP_GONE: u16 = 410;

/// Errors the watcher recovers from by itself on its next backoff step.
fn is_transient(err: &watcher::Error) -> bool {
    match err {
        watcher::Error::InitialListFailed(_)
        | watcher::Error::WatchStartFailed(_)
        | watcher::Error::WatchFailed(_) => true,
        watcher::Error::WatchError(resp) => resp.code == HTTP_GONE,
        _ => false,
    }
}

fn to_watch_event(item: Result<Event<Pod>, watcher::Error>) -> Option<PodWatchEvent> {
    match item {
        Ok(Event::Apply(pod)) | Ok(Event::InitApply(pod)) => {
            Some(PodWatchEvent::Applied(Box::new(pod)))
        }
        Ok(Event::Delete(pod)) => Some(PodWatchEvent::Deleted(Box::new(pod))),
        Ok(Event::Init) | Ok(Event::InitDone) => None,
        Err(e) if is_transient(&e) => {
            tracing::warn!(error = %e, "pod watch error, retrying");
            None
        }
        Err(e) => Some(PodWatchEvent::Unexpected(e.to_string())),
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn delete_pod(&self, namespace: &str, name: &str) -> ShareDevResult<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| {
                ShareDevError::cluster_api(format!("failed to delete pod {namespace}/{name}: {e}"))
            })
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> ShareDevResult<()> {
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map(|_| ())
            .map_err(|e| {
                ShareDevError::cluster_api(format!("failed to create pod {namespace}/{name}: {e}"))
            })
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> ShareDevResult<()> {
        let name = deployment.metadata.name.as_deref().unwrap_or_default();
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), deployment)
            .await
            .map(|_| ())
            .map_err(|e| {
                ShareDevError::cluster_api(format!(
                    "failed to create deployment {namespace}/{name}: {e}"
                ))
            })
    }

    async fn watch_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> ShareDevResult<PodWatchStream> {
        tracing::debug!(namespace, label_selector, "opening pod watch");
        let config = watcher::Config::default().labels(label_selector);
        let stream = watcher(self.pods(namespace), config)
            .default_backoff()
            .filter_map(|item| futures::future::ready(to_watch_event(item)))
            .boxed();
        Ok(stream)
    }
}
