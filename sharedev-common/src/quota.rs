// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Fractional device quota types and the workload label parser.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{LABEL_LIMITS, LABEL_MEMORY, LABEL_MODEL, LABEL_REQUESTS, LABEL_VENDOR};
use crate::status::ShareDevError;

/// A workload's request for a slice of one device.
///
/// Parsed once per cycle and never mutated afterwards. Ranges are not
/// validated: out-of-range values simply never fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareRequest {
    pub workload_id: String,
    pub vendor: String,
    pub model: String,
    /// Fraction of one device's compute.
    pub requests: f64,
    /// Fraction of one device's memory.
    pub memory: f64,
    pub limits: f64,
}

impl ShareRequest {
    /// Parse a request from a workload's labels.
    ///
    /// `sharedev.limits` is optional; when absent or not a float it falls
    /// back to `sharedev.requests`.
    pub fn from_labels(
        workload_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Self, ParseError> {
        let vendor = labels.get(LABEL_VENDOR).map(String::as_str).unwrap_or("");
        let model = labels.get(LABEL_MODEL).map(String::as_str).unwrap_or("");
        if vendor.is_empty() || model.is_empty() {
            return Err(ParseError::MissingDeviceClass);
        }

        let requests = parse_quota(labels, LABEL_REQUESTS)?;
        let memory = parse_quota(labels, LABEL_MEMORY)?;
        let limits = parse_quota(labels, LABEL_LIMITS).unwrap_or(requests);

        if limits < requests {
            tracing::warn!(
                workload = workload_id,
                requests,
                limits,
                "limits below requests, accepting as given"
            );
        }

        Ok(Self {
            workload_id: workload_id.to_string(),
            vendor: vendor.to_string(),
            model: model.to_string(),
            requests,
            memory,
            limits,
        })
    }

    /// The integer cluster resource backing this request, `<vendor>/<model>`.
    pub fn device_resource_name(&self) -> String {
        format!("{}/{}", self.vendor, self.model)
    }
}

fn parse_quota(labels: &BTreeMap<String, String>, label: &'static str) -> Result<f64, ParseError> {
    let raw = labels.get(label).map(String::as_str).unwrap_or("");
    raw.parse::<f64>().map_err(|_| ParseError::MalformedQuota {
        label,
        value: raw.to_string(),
    })
}

/// Why a workload's labels did not yield a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("pod does not have sharedev.vendor or sharedev.model label")]
    MissingDeviceClass,
    #[error("label {label} is not a float: {value:?}")]
    MalformedQuota { label: &'static str, value: String },
}

impl From<ParseError> for ShareDevError {
    fn from(err: ParseError) -> Self {
        ShareDevError::malformed_workload(err.to_string())
    }
}

/// Free capacity of one device as reported by the agent.
///
/// A snapshot: it may already be stale when Reserve runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeSlice {
    pub device_id: String,
    pub requests_free: f64,
    pub memory_free: f64,
}

impl FreeSlice {
    pub fn new(device_id: impl Into<String>, requests_free: f64, memory_free: f64) -> Self {
        Self {
            device_id: device_id.into(),
            requests_free,
            memory_free,
        }
    }
}
