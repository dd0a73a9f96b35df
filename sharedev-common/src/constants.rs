// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Constants shared by the scheduler, the agent client and the holder allocator.

/// Name of the scheduler plugin.
pub const PLUGIN_NAME: &str = "ShareDevPlugin";

/// Key under which the plugin state lives in the cycle-state container.
pub const SHARE_DEV_STATE_KEY: &str = "ShareDevStateKey";

// ─── Workload labels ──────────────────────────────────────────────

pub const LABEL_VENDOR: &str = "sharedev.vendor";
pub const LABEL_MODEL: &str = "sharedev.model";
pub const LABEL_REQUESTS: &str = "sharedev.requests";
pub const LABEL_MEMORY: &str = "sharedev.memory";
pub const LABEL_LIMITS: &str = "sharedev.limits";

/// Marker label added to rewritten workloads. The agent's GC enumerates
/// live consumers through it.
pub const LABEL_MARKER: &str = "sharedev";
pub const LABEL_MARKER_VALUE: &str = "true";

// ─── Injected environment ─────────────────────────────────────────

pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_DEVICE_ID: &str = "DEVICE_ID";
pub const ENV_HOST_IP: &str = "HOST_IP";

// ─── Device manager agent ─────────────────────────────────────────

/// TCP port of the per-node device manager agent.
pub const AGENT_PORT: u16 = 50051;

pub const GET_AVAILABLE_DEVICES_TIMEOUT_MS: u64 = 1_000;
pub const RESERVE_POD_QUOTA_TIMEOUT_MS: u64 = 10_000;
pub const UNRESERVE_POD_QUOTA_TIMEOUT_MS: u64 = 1_000;

// ─── Holder allocator ─────────────────────────────────────────────

pub const HOLDER_NAME_PREFIX: &str = "allocator";
pub const HOLDER_CONTAINER_NAME: &str = "allocator";
pub const HOLDER_IMAGE: &str = "docker.io/zbsss/device-allocator:latest";
pub const HOLDER_NAMESPACE: &str = "default";
pub const HOLDER_SELECTOR_LABEL: &str = "app";
pub const HOLDER_START_TIMEOUT_MS: u64 = 60_000;

/// Field path the holder's `HOST_IP` is resolved from.
pub const HOST_IP_FIELD_PATH: &str = "status.hostIP";

/// Maximum length of a DNS-1123 label (and of a label value).
pub const MAX_NAME_LENGTH: usize = 63;

// ─── Scores ───────────────────────────────────────────────────────

pub const MIN_NODE_SCORE: i64 = 0;
pub const MAX_NODE_SCORE: i64 = 100;
