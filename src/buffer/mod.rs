//! Buffer accounting
//!
//! Tracks the sink's buffered ranges against the playhead, derives
//! forward/backward buffer depths, raises low/sufficient health signals
//! and computes advisory eviction ranges. The accountant observes and
//! recommends; it never mutates the append surface itself.

use serde::Serialize;

use crate::config::BufferLimits;
use crate::models::BufferedRange;

pub mod accountant;

pub use accountant::BufferAccountant;

/// Derived snapshot of buffer health around the playhead.
#[derive(Debug, Clone, Serialize)]
pub struct BufferInfo {
    pub ranges: Vec<BufferedRange>,
    pub current_time: f64,
    /// Seconds of media buffered ahead of the playhead, within the range
    /// containing it (zero when the playhead sits in a gap).
    pub forward_buffer: f64,
    /// Seconds of media buffered behind the playhead, same containment rule.
    pub backward_buffer: f64,
    pub target_buffer: f64,
    pub max_buffer: f64,
}

impl BufferInfo {
    /// Derive buffer depths for `current_time` over a normalized range set.
    pub fn derive(current_time: f64, ranges: Vec<BufferedRange>, limits: &BufferLimits) -> Self {
        let (forward, backward) = match ranges.iter().find(|r| r.contains(current_time)) {
            Some(r) => (r.end - current_time, current_time - r.start),
            None => (0.0, 0.0),
        };
        Self {
            ranges,
            current_time,
            forward_buffer: forward,
            backward_buffer: backward,
            target_buffer: limits.target_buffer,
            max_buffer: limits.max_buffer,
        }
    }
}

/// Sort, drop degenerate ranges and merge overlaps so the set is
/// pairwise disjoint and ascending.
pub fn normalize_ranges(mut ranges: Vec<BufferedRange>) -> Vec<BufferedRange> {
    ranges.retain(|r| r.end > r.start && r.start.is_finite() && r.end.is_finite());
    ranges.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut out: Vec<BufferedRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match out.last_mut() {
            Some(last) if r.start <= last.end => {
                last.end = last.end.max(r.end);
            }
            _ => out.push(r),
        }
    }
    out
}

/// Compute the minimal list of ranges to evict around the playhead.
///
/// Keeps `[current_time - back_buffer, current_time + max_buffer]`
/// intact; everything buffered outside that window is returned.
pub fn compute_eviction(
    current_time: f64,
    ranges: &[BufferedRange],
    limits: &BufferLimits,
) -> Vec<BufferedRange> {
    let safe_back = current_time - limits.back_buffer;
    let ahead = current_time + limits.max_buffer;
    let mut evictions = Vec::new();

    for r in ranges {
        if r.end <= safe_back {
            evictions.push(*r);
            continue;
        }
        if r.start < safe_back {
            evictions.push(BufferedRange::new(r.start, safe_back));
        }
        if r.end > ahead {
            evictions.push(BufferedRange::new(ahead.max(r.start), r.end));
        }
    }
    evictions
}
