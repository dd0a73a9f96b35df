// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Slice feasibility, worst-fit selection and score normalization.

use sharedev_common::constants::{MAX_NODE_SCORE, MIN_NODE_SCORE};
use sharedev_common::quota::{FreeSlice, ShareRequest};

use crate::framework::NodeScore;

/// Whether `slice` has room for both the compute and the memory share.
pub fn fits(request: &ShareRequest, slice: &FreeSlice) -> bool {
    request.requests <= slice.requests_free && request.memory <= slice.memory_free
}

/// Compute plus memory left on the slice after placing the request.
fn headroom(request: &ShareRequest, slice: &FreeSlice) -> f64 {
    (slice.requests_free - request.requests) + (slice.memory_free - request.memory)
}

fn to_score(headroom: f64) -> i64 {
    ((headroom * 100.0).round() as i64).clamp(MIN_NODE_SCORE, MAX_NODE_SCORE)
}

/// Pick the fitting slice with the most headroom (worst fit), first one on
/// ties. Returns its clamped score, or `MIN_NODE_SCORE` and `None` when
/// nothing fits.
pub fn best_fit<'a>(
    request: &ShareRequest,
    slices: &'a [FreeSlice],
) -> (i64, Option<&'a FreeSlice>) {
    let mut best: Option<(f64, &FreeSlice)> = None;
    for slice in slices.iter().filter(|s| fits(request, s)) {
        let room = headroom(request, slice);
        match best {
            Some((best_room, _)) if best_room >= room => {}
            _ => best = Some((room, slice)),
        }
    }
    match best {
        Some((room, slice)) => (to_score(room), Some(slice)),
        None => (MIN_NODE_SCORE, None),
    }
}

/// Rescale and invert raw scores in place: the lowest raw score maps to
/// `MAX_NODE_SCORE` and the highest to `MIN_NODE_SCORE`.
///
/// All-zero and empty lists are left unchanged. When every score is equal
/// they all become `MAX_NODE_SCORE`.
pub fn normalize_scores(scores: &mut [NodeScore]) {
    let (Some(min), Some(max)) = (
        scores.iter().map(|s| s.score).min(),
        scores.iter().map(|s| s.score).max(),
    ) else {
        return;
    };

    if min == 0 && max == 0 {
        return;
    }

    if max == min {
        for s in scores.iter_mut() {
            s.score = MAX_NODE_SCORE - (s.score - min);
        }
        return;
    }

    let range = (max - min) as f64;
    for s in scores.iter_mut() {
        let scaled = (MAX_NODE_SCORE as f64 * (s.score - min) as f64 / range).round() as i64;
        s.score = MAX_NODE_SCORE - scaled;
    }
}
