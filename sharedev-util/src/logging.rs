// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Logging setup using the `tracing` ecosystem.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize logging for a sharedev component.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (SHAREDEV_LOG_LEVEL, then RUST_LOG)
/// - Optional file output, falling back to stderr if the file cannot be opened
/// - Component name in the first log line
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_sharedev_logging(component: &str, log_dir: Option<&Path>, verbosity: i32) {
    let filter = EnvFilter::try_from_env("SHAREDEV_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file = log_dir.and_then(|dir| {
        let log_file = dir.join(format!("{component}.log"));
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("cannot open {}: {e}, logging to stderr", log_file.display());
                None
            }
        }
    });

    let installed = match file {
        Some(file) => subscriber.with_writer(file).try_init().is_ok(),
        None => subscriber.try_init().is_ok(),
    };

    if installed {
        tracing::info!(component, "sharedev logging initialized");
    }
}

fn default_level(verbosity: i32) -> &'static str {
    match verbosity {
        i32::MIN..=0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
