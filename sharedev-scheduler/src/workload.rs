// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Accessors over workload (Pod) objects.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;

use sharedev_common::quota::{ParseError, ShareRequest};

const DEFAULT_NAMESPACE: &str = "default";

pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

pub fn pod_namespace(pod: &Pod) -> &str {
    pod.metadata
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE)
}

/// `namespace/name`, for logs.
pub fn pod_key(pod: &Pod) -> String {
    format!("{}/{}", pod_namespace(pod), pod_name(pod))
}

/// Parse the share request carried in the pod's labels. The workload id is
/// the pod name.
pub fn share_request(pod: &Pod) -> Result<ShareRequest, ParseError> {
    let empty = BTreeMap::new();
    let labels = pod.metadata.labels.as_ref().unwrap_or(&empty);
    ShareRequest::from_labels(pod_name(pod), labels)
}
