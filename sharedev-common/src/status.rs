// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Error types for sharedev.
//!
//! Every failure inside the scheduling cycle is a `ShareDevError` carrying an
//! `ErrorKind`. The hooks translate kinds into orchestrator statuses.

use std::fmt;

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Workload labels could not be parsed into a request.
    MalformedWorkload,
    /// Could not connect to the agent.
    Dial,
    /// The agent did not answer within the call's deadline.
    DeadlineExceeded,
    /// The agent answered with an RPC error.
    Rpc,
    /// The cycle was cancelled while the call was in flight.
    Cancelled,
    /// Slices exist on the node but none fits.
    NoFitOnNode,
    /// The node has no InternalIP address.
    MissingNodeAddress,
    /// Creating the holder workload failed.
    HolderSubmissionFailed,
    /// The holder did not reach Running in time.
    HolderDidNotStart,
    /// The holder watch produced something it should not have.
    WatchProtocolError,
    /// Cycle state absent at a stage that requires it.
    StateMissing,
    /// The cluster API rejected a workload replace.
    ClusterApi,
    /// Configuration failed validation.
    InvalidConfig,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedWorkload => "MalformedWorkload",
            Self::Dial => "Dial",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Rpc => "Rpc",
            Self::Cancelled => "Cancelled",
            Self::NoFitOnNode => "NoFitOnNode",
            Self::MissingNodeAddress => "MissingNodeAddress",
            Self::HolderSubmissionFailed => "HolderSubmissionFailed",
            Self::HolderDidNotStart => "HolderDidNotStart",
            Self::WatchProtocolError => "WatchProtocolError",
            Self::StateMissing => "StateMissing",
            Self::ClusterApi => "ClusterApi",
            Self::InvalidConfig => "InvalidConfig",
        }
    }

    /// Parse an error kind from its string name.
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "MalformedWorkload" => Some(Self::MalformedWorkload),
            "Dial" => Some(Self::Dial),
            "DeadlineExceeded" => Some(Self::DeadlineExceeded),
            "Rpc" => Some(Self::Rpc),
            "Cancelled" => Some(Self::Cancelled),
            "NoFitOnNode" => Some(Self::NoFitOnNode),
            "MissingNodeAddress" => Some(Self::MissingNodeAddress),
            "HolderSubmissionFailed" => Some(Self::HolderSubmissionFailed),
            "HolderDidNotStart" => Some(Self::HolderDidNotStart),
            "WatchProtocolError" => Some(Self::WatchProtocolError),
            "StateMissing" => Some(Self::StateMissing),
            "ClusterApi" => Some(Self::ClusterApi),
            "InvalidConfig" => Some(Self::InvalidConfig),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The primary error type for sharedev operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ShareDevError {
    pub kind: ErrorKind,
    pub message: String,
    /// For `Rpc`, the gRPC status code returned by the agent.
    pub rpc_code: Option<i32>,
}

impl ShareDevError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rpc_code: None,
        }
    }

    pub fn malformed_workload(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedWorkload, msg)
    }
    pub fn dial(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dial, msg)
    }
    pub fn deadline_exceeded(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, msg)
    }
    pub fn rpc(msg: impl Into<String>, rpc_code: i32) -> Self {
        Self {
            kind: ErrorKind::Rpc,
            message: msg.into(),
            rpc_code: Some(rpc_code),
        }
    }
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, msg)
    }
    pub fn no_fit_on_node(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoFitOnNode, msg)
    }
    pub fn missing_node_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingNodeAddress, msg)
    }
    pub fn holder_submission_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::HolderSubmissionFailed, msg)
    }
    pub fn holder_did_not_start(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::HolderDidNotStart, msg)
    }
    pub fn watch_protocol_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::WatchProtocolError, msg)
    }
    pub fn state_missing(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateMissing, msg)
    }
    pub fn cluster_api(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClusterApi, msg)
    }
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig, msg)
    }

    /// Dial, deadline and RPC failures talking to an agent.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Dial | ErrorKind::DeadlineExceeded | ErrorKind::Rpc
        )
    }
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
    pub fn is_state_missing(&self) -> bool {
        self.kind == ErrorKind::StateMissing
    }
    pub fn is_holder_failure(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::HolderSubmissionFailed
                | ErrorKind::HolderDidNotStart
                | ErrorKind::WatchProtocolError
        )
    }
}

/// Convenience type alias: `Result<T, ShareDevError>`.
pub type ShareDevResult<T> = Result<T, ShareDevError>;
