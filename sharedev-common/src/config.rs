// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Scheduler configuration.
//!
//! A plain struct with defaults. Supports:
//! - JSON overrides (keys are the field names)
//! - Environment variable overrides: `SHAREDEV_<field_name>`

use std::time::Duration;

use crate::constants;
use crate::status::{ShareDevError, ShareDevResult};

/// Tunables for the plugin, the agent client and the holder allocator.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    // ─── Agent RPC ────────────────────────────────────────────
    pub agent_port: u16,
    pub get_devices_timeout_ms: u64,
    pub reserve_timeout_ms: u64,
    pub unreserve_timeout_ms: u64,

    // ─── Holder allocator ─────────────────────────────────────
    pub holder_namespace: String,
    pub holder_image: String,
    pub holder_start_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            agent_port: constants::AGENT_PORT,
            get_devices_timeout_ms: constants::GET_AVAILABLE_DEVICES_TIMEOUT_MS,
            reserve_timeout_ms: constants::RESERVE_POD_QUOTA_TIMEOUT_MS,
            unreserve_timeout_ms: constants::UNRESERVE_POD_QUOTA_TIMEOUT_MS,
            holder_namespace: constants::HOLDER_NAMESPACE.to_string(),
            holder_image: constants::HOLDER_IMAGE.to_string(),
            holder_start_timeout_ms: constants::HOLDER_START_TIMEOUT_MS,
        }
    }
}

impl SchedulerConfig {
    /// Parse from a JSON object, then apply environment overrides.
    pub fn from_json(json: &str) -> ShareDevResult<Self> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| ShareDevError::invalid_config(format!("JSON parse error: {e}")))?;

        let mut config = Self::default();

        macro_rules! set_field {
            ($field:ident, u64) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_u64()) {
                    config.$field = v;
                }
            };
            ($field:ident, u16) => {
                if let Some(v) = map
                    .get(stringify!($field))
                    .and_then(|v| v.as_u64())
                    .and_then(|v| u16::try_from(v).ok())
                {
                    config.$field = v;
                }
            };
            ($field:ident, String) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_str()) {
                    config.$field = v.to_string();
                }
            };
        }

        set_field!(agent_port, u16);
        set_field!(get_devices_timeout_ms, u64);
        set_field!(reserve_timeout_ms, u64);
        set_field!(unreserve_timeout_ms, u64);
        set_field!(holder_namespace, String);
        set_field!(holder_image, String);
        set_field!(holder_start_timeout_ms, u64);

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> ShareDevResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides of the form `SHAREDEV_<name>`.
    fn apply_env_overrides(&mut self) {
        macro_rules! env_override {
            ($field:ident, $ty:ty) => {
                let env_key = concat!("SHAREDEV_", stringify!($field));
                if let Ok(val) = std::env::var(env_key) {
                    match val.parse::<$ty>() {
                        Ok(v) => self.$field = v,
                        Err(_) => tracing::warn!(env_key, value = %val, "ignoring bad override"),
                    }
                }
            };
        }

        env_override!(agent_port, u16);
        env_override!(get_devices_timeout_ms, u64);
        env_override!(reserve_timeout_ms, u64);
        env_override!(unreserve_timeout_ms, u64);
        env_override!(holder_namespace, String);
        env_override!(holder_image, String);
        env_override!(holder_start_timeout_ms, u64);
    }

    pub fn validate(&self) -> ShareDevResult<()> {
        if self.agent_port == 0 {
            return Err(ShareDevError::invalid_config("agent_port must be non-zero"));
        }
        let timeouts = [
            ("get_devices_timeout_ms", self.get_devices_timeout_ms),
            ("reserve_timeout_ms", self.reserve_timeout_ms),
            ("unreserve_timeout_ms", self.unreserve_timeout_ms),
            ("holder_start_timeout_ms", self.holder_start_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ShareDevError::invalid_config(format!(
                    "{name} must be non-zero"
                )));
            }
        }
        if self.holder_namespace.is_empty() || self.holder_image.is_empty() {
            return Err(ShareDevError::invalid_config(
                "holder_namespace and holder_image must be set",
            ));
        }
        Ok(())
    }

    pub fn get_devices_timeout(&self) -> Duration {
        Duration::from_millis(self.get_devices_timeout_ms)
    }

    pub fn reserve_timeout(&self) -> Duration {
        Duration::from_millis(self.reserve_timeout_ms)
    }

    pub fn unreserve_timeout(&self) -> Duration {
        Duration::from_millis(self.unreserve_timeout_ms)
    }

    pub fn holder_start_timeout(&self) -> Duration {
        Duration::from_millis(self.holder_start_timeout_ms)
    }
}
