// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Builders for workload, node and holder objects.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, Node, NodeAddress, NodeStatus, Pod, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use sharedev_common::constants::{LABEL_MEMORY, LABEL_MODEL, LABEL_REQUESTS, LABEL_VENDOR};

/// The four required share labels.
pub fn share_labels(vendor: &str, model: &str, requests: f64, memory: f64) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_VENDOR.to_string(), vendor.to_string()),
        (LABEL_MODEL.to_string(), model.to_string()),
        (LABEL_REQUESTS.to_string(), requests.to_string()),
        (LABEL_MEMORY.to_string(), memory.to_string()),
    ])
}

/// A pending workload with one container named `main`.
pub fn make_pod(name: &str, namespace: &str, labels: BTreeMap<String, String>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            resource_version: Some("1".to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                image: Some("busybox".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        }),
    }
}

/// A node, optionally with an `InternalIP` address.
pub fn make_node(name: &str, internal_ip: Option<&str>) -> Node {
    let mut addresses = vec![NodeAddress {
        address: name.to_string(),
        type_: "Hostname".to_string(),
    }];
    if let Some(ip) = internal_ip {
        addresses.push(NodeAddress {
            address: ip.to_string(),
            type_: "InternalIP".to_string(),
        });
    }
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        status: Some(NodeStatus {
            addresses: Some(addresses),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A holder pod in `phase`, placed on `node` when given.
pub fn holder_pod(name: &str, phase: &str, node: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: node.map(str::to_string),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}
