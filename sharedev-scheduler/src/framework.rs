// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Scheduling framework surface: status codes, the per-cycle state
//! container, node views and the extension point traits.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Pod};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use sharedev_common::status::{ShareDevError, ShareDevResult};

// ─── Status ─────────────────────────────────────────────────────────────────

/// Result code of an extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Success,
    /// The node cannot take the workload right now; preemption or a new
    /// device may change that.
    Unschedulable,
    /// The node cannot take the workload and nothing on it will change that.
    UnschedulableAndUnresolvable,
    /// Internal or transport failure.
    Error,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Success => "Success",
            Code::Unschedulable => "Unschedulable",
            Code::UnschedulableAndUnresolvable => "UnschedulableAndUnresolvable",
            Code::Error => "Error",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    code: Code,
    reasons: Vec<String>,
}

impl Status {
    pub fn new(code: Code, reason: impl Into<String>) -> Self {
        Self {
            code,
            reasons: vec![reason.into()],
        }
    }

    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reasons: Vec::new(),
        }
    }

    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self::new(Code::Unschedulable, reason)
    }

    pub fn unresolvable(reason: impl Into<String>) -> Self {
        Self::new(Code::UnschedulableAndUnresolvable, reason)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(Code::Error, reason)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    /// All reasons joined with `", "`.
    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }
}

impl From<ShareDevError> for Status {
    fn from(err: ShareDevError) -> Self {
        Status::error(err.to_string())
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reasons.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message())
        }
    }
}

/// Filter outcome for every node that did not pass.
pub type NodeToStatusMap = HashMap<String, Status>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

impl NodeScore {
    pub fn new(name: impl Into<String>, score: i64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFilterResult {
    pub nominated_node_name: String,
}

// ─── Cancellation ───────────────────────────────────────────────────────────

/// Await `fut` unless `cancel` fires first, in which case `fut` is dropped
/// and a `Cancelled` error naming `what` is returned.
pub async fn until_cancelled<T, F>(
    cancel: &CancellationToken,
    what: &str,
    fut: F,
) -> ShareDevResult<T>
where
    F: Future<Output = ShareDevResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ShareDevError::cancelled(format!("{what} cancelled"))),
        result = fut => result,
    }
}

// ─── Node view ──────────────────────────────────────────────────────────────

const INTERNAL_IP: &str = "InternalIP";

/// Read-only view of a candidate node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    node: Node,
}

impl NodeInfo {
    pub fn new(node: Node) -> Self {
        Self { node }
    }

    pub fn name(&self) -> &str {
        self.node.metadata.name.as_deref().unwrap_or_default()
    }

    /// First address of type `InternalIP`, if any.
    pub fn internal_ip(&self) -> Option<&str> {
        self.node
            .status
            .as_ref()?
            .addresses
            .as_ref()?
            .iter()
            .find(|addr| addr.type_ == INTERNAL_IP && !addr.address.is_empty())
            .map(|addr| addr.address.as_str())
    }
}

// ─── Cycle state ────────────────────────────────────────────────────────────

/// A value stored in a `CycleState`.
pub trait StateData: Send + Sync + 'static {
    /// Deep, independent copy.
    fn clone_data(&self) -> Arc<dyn StateData>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Keyed scratchpad shared by every extension point of one scheduling
/// cycle. Cloning copies each value through `clone_data`.
#[derive(Default)]
pub struct CycleState {
    storage: RwLock<HashMap<String, Arc<dyn StateData>>>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, key: &str) -> ShareDevResult<Arc<dyn StateData>> {
        self.storage
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ShareDevError::state_missing(format!("no cycle state under {key}")))
    }

    /// Read and downcast to the concrete type stored under `key`.
    pub fn read_as<T: StateData>(&self, key: &str) -> ShareDevResult<Arc<T>> {
        self.read(key)?
            .into_any()
            .downcast::<T>()
            .map_err(|_| ShareDevError::state_missing(format!("cycle state {key} has wrong type")))
    }

    pub fn write(&self, key: impl Into<String>, data: Arc<dyn StateData>) {
        self.storage.write().insert(key.into(), data);
    }

    pub fn delete(&self, key: &str) {
        self.storage.write().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.storage.read().contains_key(key)
    }
}

impl Clone for CycleState {
    fn clone(&self) -> Self {
        let storage = self
            .storage
            .read()
            .iter()
            .map(|(key, data)| (key.clone(), data.clone_data()))
            .collect();
        Self {
            storage: RwLock::new(storage),
        }
    }
}

// ─── Extension points ───────────────────────────────────────────────────────

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
}

#[async_trait::async_trait]
pub trait PreFilterPlugin: Plugin {
    async fn pre_filter(&self, state: &CycleState, pod: &Pod) -> Status;
}

#[async_trait::async_trait]
pub trait FilterPlugin: Plugin {
    async fn filter(
        &self,
        state: &CycleState,
        pod: &Pod,
        node: &NodeInfo,
        cancel: &CancellationToken,
    ) -> Status;
}

#[async_trait::async_trait]
pub trait PostFilterPlugin: Plugin {
    /// Runs when no node passed Filter.
    async fn post_filter(
        &self,
        state: &CycleState,
        pod: &Pod,
        filtered: &NodeToStatusMap,
        cancel: &CancellationToken,
    ) -> Result<PostFilterResult, Status>;
}

#[async_trait::async_trait]
pub trait ScorePlugin: Plugin {
    async fn score(&self, state: &CycleState, pod: &Pod, node_name: &str) -> Result<i64, Status>;

    /// Rescale the scores of all feasible nodes in place.
    fn normalize_score(&self, state: &CycleState, pod: &Pod, scores: &mut [NodeScore]) -> Status;
}

#[async_trait::async_trait]
pub trait ReservePlugin: Plugin {
    async fn reserve(
        &self,
        state: &CycleState,
        pod: &Pod,
        node_name: &str,
        cancel: &CancellationToken,
    ) -> Status;

    /// Undo a reservation. Must be idempotent; takes no cancellation token.
    async fn unreserve(&self, state: &CycleState, pod: &Pod, node_name: &str);
}
