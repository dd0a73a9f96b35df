// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Drives one scheduling cycle through a plugin's extension points.

use std::sync::Arc;

use futures::future::join_all;
use k8s_openapi::api::core::v1::Pod;
use tokio_util::sync::CancellationToken;

use crate::framework::{
    Code, CycleState, FilterPlugin, NodeInfo, NodeScore, NodeToStatusMap, PostFilterPlugin,
    PreFilterPlugin, ReservePlugin, ScorePlugin, Status,
};
use crate::workload::pod_key;

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A slice was reserved and the workload rewritten onto `node`.
    Bound { node: String },
    /// No node fit; a new device came up on `node` for the next attempt.
    Nominated { node: String },
    /// Nothing placed. `retryable` is false only when the workload itself
    /// is unusable.
    Unschedulable { retryable: bool, reasons: Vec<String> },
    /// An extension point failed after nodes were chosen.
    Failed { status: Status },
}

/// Runs PreFilter, Filter, PostFilter, Score, NormalizeScore, Reserve and,
/// on failure after Reserve, Unreserve. Never re-enters a cycle.
pub struct CycleRunner<P> {
    plugin: Arc<P>,
}

impl<P> CycleRunner<P>
where
    P: PreFilterPlugin + FilterPlugin + PostFilterPlugin + ScorePlugin + ReservePlugin,
{
    pub fn new(plugin: Arc<P>) -> Self {
        Self { plugin }
    }

    pub async fn run(&self, pod: &Pod, nodes: &[NodeInfo], cancel: &CancellationToken) -> CycleOutcome {
        self.run_with_state(&CycleState::new(), pod, nodes, cancel)
            .await
    }

    /// Like `run`, against a caller-provided state container.
    pub async fn run_with_state(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: &[NodeInfo],
        cancel: &CancellationToken,
    ) -> CycleOutcome {
        let plugin = self.plugin.as_ref();
        let key = pod_key(pod);

        let status = plugin.pre_filter(state, pod).await;
        match status.code() {
            Code::Success => {}
            Code::Error => return CycleOutcome::Failed { status },
            _ => {
                return CycleOutcome::Unschedulable {
                    retryable: false,
                    reasons: status.reasons().to_vec(),
                }
            }
        }

        // ─── Filter ─────────────────────────────────────────────────────
        let statuses = join_all(
            nodes
                .iter()
                .map(|node| plugin.filter(state, pod, node, cancel)),
        )
        .await;

        let mut feasible = Vec::new();
        let mut filtered = NodeToStatusMap::new();
        for (node, status) in nodes.iter().zip(statuses) {
            if status.is_success() {
                feasible.push(node.name().to_string());
            } else {
                filtered.insert(node.name().to_string(), status);
            }
        }
        tracing::debug!(pod = %key, num_nodes = nodes.len(), num_feasible = feasible.len(), "filter done");

        if cancel.is_cancelled() {
            return CycleOutcome::Failed {
                status: Status::error("scheduling cycle cancelled"),
            };
        }

        if feasible.is_empty() {
            let reasons: Vec<String> = nodes
                .iter()
                .filter_map(|n| filtered.get(n.name()))
                .flat_map(|s| s.reasons().iter().cloned())
                .collect();
            if filtered.values().all(|s| s.code() == Code::Error) {
                return CycleOutcome::Unschedulable {
                    retryable: true,
                    reasons,
                };
            }
            return match plugin.post_filter(state, pod, &filtered, cancel).await {
                Ok(result) => CycleOutcome::Nominated {
                    node: result.nominated_node_name,
                },
                Err(status) => {
                    tracing::warn!(pod = %key, status = %status, "post filter failed");
                    CycleOutcome::Unschedulable {
                        retryable: true,
                        reasons: status.reasons().to_vec(),
                    }
                }
            };
        }

        // ─── Score ──────────────────────────────────────────────────────
        let results = join_all(feasible.iter().map(|name| plugin.score(state, pod, name))).await;
        let mut scores = Vec::with_capacity(feasible.len());
        for (name, result) in feasible.iter().zip(results) {
            match result {
                Ok(score) => scores.push(NodeScore::new(name.clone(), score)),
                Err(status) => return CycleOutcome::Failed { status },
            }
        }
        let status = plugin.normalize_score(state, pod, &mut scores);
        if !status.is_success() {
            return CycleOutcome::Failed { status };
        }

        // Highest score, earliest candidate on ties.
        let mut winner: Option<&NodeScore> = None;
        for score in &scores {
            if winner.map_or(true, |w| score.score > w.score) {
                winner = Some(score);
            }
        }
        let Some(winner) = winner.map(|w| w.name.clone()) else {
            return CycleOutcome::Failed {
                status: Status::error("no scored node"),
            };
        };

        // ─── Reserve ────────────────────────────────────────────────────
        let status = plugin.reserve(state, pod, &winner, cancel).await;
        if !status.is_success() {
            plugin.unreserve(state, pod, &winner).await;
            return CycleOutcome::Failed { status };
        }
        if cancel.is_cancelled() {
            plugin.unreserve(state, pod, &winner).await;
            return CycleOutcome::Failed {
                status: Status::error("scheduling cycle cancelled after reserve"),
            };
        }

        tracing::info!(pod = %key, node = %winner, "cycle bound");
        CycleOutcome::Bound { node: winner }
    }
}
