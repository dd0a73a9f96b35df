// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Builds the replacement workload pinned to its reserved slice.

use k8s_openapi::api::core::v1::{EnvVar, Pod};

use sharedev_common::constants::{
    ENV_CLIENT_ID, ENV_DEVICE_ID, ENV_HOST_IP, LABEL_MARKER, LABEL_MARKER_VALUE,
};

use crate::workload::pod_name;

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

/// Copy of `pod` bound to `node_name`, marked for the agent's GC and with
/// the slice coordinates appended to every container's environment.
///
/// Server-populated identity fields and status are cleared so the copy can
/// be created as a new object under the same name.
pub fn rewrite_workload(pod: &Pod, node_name: &str, device_id: &str, node_ip: &str) -> Pod {
    let mut rewritten = pod.clone();
    let client_id = pod_name(pod).to_string();

    let meta = &mut rewritten.metadata;
    meta.resource_version = None;
    meta.uid = None;
    meta.creation_timestamp = None;
    meta.deletion_timestamp = None;
    meta.deletion_grace_period_seconds = None;
    meta.managed_fields = None;
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(LABEL_MARKER.to_string(), LABEL_MARKER_VALUE.to_string());
    rewritten.status = None;

    let spec = rewritten.spec.get_or_insert_with(Default::default);
    spec.node_name = Some(node_name.to_string());
    for container in spec.containers.iter_mut() {
        let env = container.env.get_or_insert_with(Vec::new);
        env.push(env_var(ENV_CLIENT_ID, &client_id));
        env.push(env_var(ENV_DEVICE_ID, device_id));
        env.push(env_var(ENV_HOST_IP, node_ip));
    }

    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{Container, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn workload() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("w".to_string()),
                namespace: Some("ml".to_string()),
                resource_version: Some("42".to_string()),
                uid: Some("0000-1111".to_string()),
                creation_timestamp: Some(Time(Default::default())),
                labels: Some(BTreeMap::from([("team".to_string(), "x".to_string())])),
                annotations: Some(BTreeMap::from([("keep".to_string(), "me".to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                scheduler_name: Some("sharedev".to_string()),
                containers: vec![
                    Container {
                        name: "main".to_string(),
                        image: Some("busybox".to_string()),
                        env: Some(vec![env_var("EXISTING", "1")]),
                        ..Default::default()
                    },
                    Container {
                        name: "sidecar".to_string(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                ..Default::default()
            }),
        }
    }

    fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
        container
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    #[test]
    fn test_rewrite_injects_slice_coordinates() {
        let original = workload();
        let rewritten = rewrite_workload(&original, "n1", "d1", "10.0.0.1");

        let spec = rewritten.spec.as_ref().unwrap();
        assert_eq!(spec.node_name.as_deref(), Some("n1"));
        for container in &spec.containers {
            assert_eq!(env_value(container, ENV_CLIENT_ID), Some("w"));
            assert_eq!(env_value(container, ENV_DEVICE_ID), Some("d1"));
            assert_eq!(env_value(container, ENV_HOST_IP), Some("10.0.0.1"));
        }
        // Existing env comes first and is kept.
        let main_env = spec.containers[0].env.as_ref().unwrap();
        assert_eq!(main_env[0].name, "EXISTING");
        assert_eq!(main_env.len(), 4);

        let labels = rewritten.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(LABEL_MARKER).map(String::as_str), Some("true"));
        assert_eq!(labels.get("team").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_rewrite_clears_server_fields_and_keeps_the_rest() {
        let original = workload();
        let rewritten = rewrite_workload(&original, "n1", "d1", "10.0.0.1");

        assert!(rewritten.metadata.resource_version.is_none());
        assert!(rewritten.metadata.uid.is_none());
        assert!(rewritten.metadata.creation_timestamp.is_none());
        assert!(rewritten.status.is_none());

        assert_eq!(rewritten.metadata.name, original.metadata.name);
        assert_eq!(rewritten.metadata.namespace, original.metadata.namespace);
        assert_eq!(rewritten.metadata.annotations, original.metadata.annotations);
        let spec = rewritten.spec.as_ref().unwrap();
        assert_eq!(spec.scheduler_name.as_deref(), Some("sharedev"));
        assert_eq!(spec.containers[0].image.as_deref(), Some("busybox"));

        // The input is untouched.
        assert_eq!(original.metadata.resource_version.as_deref(), Some("42"));
        assert!(original.spec.as_ref().unwrap().node_name.is_none());
    }
}
