// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Per-cycle scratchpad of the share plugin.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use sharedev_common::constants::SHARE_DEV_STATE_KEY;
use sharedev_common::quota::{FreeSlice, ShareRequest};
use sharedev_common::status::ShareDevResult;

use crate::framework::{CycleState, StateData};

/// What Filter learned about one node: its agent address and free slices.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInventory {
    pub node_ip: String,
    pub slices: Vec<FreeSlice>,
}

/// Shared by every extension point of one cycle.
///
/// `request` is fixed at construction. Each node's inventory is written
/// only by that node's Filter, so concurrent Filters touch disjoint shards.
/// `reserved_device_id` is set by a successful Reserve and cleared by
/// Unreserve.
#[derive(Debug)]
pub struct ShareDevState {
    request: ShareRequest,
    inventory: DashMap<String, NodeInventory>,
    reserved_device_id: Mutex<Option<String>>,
}

impl ShareDevState {
    pub fn new(request: ShareRequest) -> Self {
        Self {
            request,
            inventory: DashMap::new(),
            reserved_device_id: Mutex::new(None),
        }
    }

    /// Fetch the plugin state out of a cycle's container.
    pub fn read_from(state: &CycleState) -> ShareDevResult<Arc<Self>> {
        state.read_as::<Self>(SHARE_DEV_STATE_KEY)
    }

    pub fn request(&self) -> &ShareRequest {
        &self.request
    }

    pub fn record_inventory(&self, node_name: &str, node_ip: &str, slices: Vec<FreeSlice>) {
        self.inventory.insert(
            node_name.to_string(),
            NodeInventory {
                node_ip: node_ip.to_string(),
                slices,
            },
        );
    }

    pub fn inventory(&self, node_name: &str) -> Option<NodeInventory> {
        self.inventory.get(node_name).map(|entry| entry.value().clone())
    }

    pub fn node_ip(&self, node_name: &str) -> Option<String> {
        self.inventory
            .get(node_name)
            .map(|entry| entry.node_ip.clone())
    }

    pub fn num_nodes(&self) -> usize {
        self.inventory.len()
    }

    pub fn set_reserved_device(&self, device_id: impl Into<String>) {
        *self.reserved_device_id.lock() = Some(device_id.into());
    }

    pub fn reserved_device(&self) -> Option<String> {
        self.reserved_device_id.lock().clone()
    }

    /// Clear and return the reserved device, if any.
    pub fn take_reserved_device(&self) -> Option<String> {
        self.reserved_device_id.lock().take()
    }

    pub fn deep_clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            inventory: self.inventory.clone(),
            reserved_device_id: Mutex::new(self.reserved_device()),
        }
    }
}

impl StateData for ShareDevState {
    fn clone_data(&self) -> Arc<dyn StateData> {
        Arc::new(self.deep_clone())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
