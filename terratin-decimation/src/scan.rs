//! Triangle scan conversion and error tracking
//!
//! Whenever a triangle is created or rewritten, it is rasterized back
//! onto the grid: every raster point it covers is re-assigned to it as
//! owner and its interpolation error recomputed. The single worst point
//! of each triangle is kept in a max-priority queue, which the greedy
//! scheduler pops from.

use std::cmp::Ordering;
use std::collections::HashMap;

use itertools::Itertools;
use priority_queue::PriorityQueue;

use crate::greedy::{DecimationRun, PointOwner};

/// Interpolation error of a queued raster point. Total order over the
/// raw `f64` so it can act as a queue priority; ties break by heap
/// internals, which is deliberately unspecified.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate(pub f64);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Max-priority queue of raster points keyed by interpolation error.
///
/// Each triangle queues at most its single worst point, and each raster
/// point has at most one live entry. The per-triangle `queued` slots and
/// the point-to-triangle claim map keep the two directions consistent
/// when triangles are rewritten or points change owner.
#[derive(Debug, Default)]
pub(crate) struct ErrorTracker {
    queue: PriorityQueue<usize, Candidate>,
    /// triangle id -> the point it currently has queued
    queued: Vec<Option<usize>>,
    /// point id -> the triangle that queued it
    claimed_by: HashMap<usize, usize>,
}

impl ErrorTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn ensure_triangle(&mut self, tri: usize) {
        if tri >= self.queued.len() {
            self.queued.resize(tri + 1, None);
        }
    }

    /// Drop the entry a triangle has queued, if any.
    fn release(&mut self, tri: usize) {
        if let Some(pid) = self.queued[tri].take() {
            self.queue.remove(&pid);
            self.claimed_by.remove(&pid);
        }
    }

    /// Queue `pid` with `error` on behalf of `tri`, replacing any stale
    /// entry for the same point.
    fn claim(&mut self, tri: usize, pid: usize, error: f64) {
        if let Some(old) = self.claimed_by.insert(pid, tri) {
            if old != tri {
                self.queued[old] = None;
            }
        }
        self.queue.push(pid, Candidate(error));
        self.queued[tri] = Some(pid);
    }

    /// Remove a point's entry regardless of which triangle queued it.
    pub(crate) fn discard(&mut self, pid: usize) {
        if self.queue.remove(&pid).is_some() {
            if let Some(tri) = self.claimed_by.remove(&pid) {
                self.queued[tri] = None;
            }
        }
    }

    /// Pop the maximum-error entry.
    pub(crate) fn pop(&mut self) -> Option<(usize, f64)> {
        let (pid, Candidate(error)) = self.queue.pop()?;
        if let Some(tri) = self.claimed_by.remove(&pid) {
            self.queued[tri] = None;
        }
        Some((pid, error))
    }
}

/// A triangulation vertex projected to continuous image space: fractional
/// column, row, and height.
#[derive(Debug, Clone, Copy)]
struct ImagePoint {
    i: f64,
    j: f64,
    h: f64,
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

impl DecimationRun<'_> {
    /// Re-rasterize a triangle: refresh ownership and error of every
    /// raster point it covers and queue its worst point.
    pub(crate) fn update_triangle(&mut self, tri: usize) {
        self.tracker.ensure_triangle(tri);
        self.tracker.release(tri);

        let sorted: Vec<ImagePoint> = self
            .mesh
            .cell_points(tri)
            .iter()
            .map(|&v| self.image_point(v))
            .sorted_by(|a, b| a.j.total_cmp(&b.j))
            .collect();
        let (lo, mid, hi) = (sorted[0], sorted[1], sorted[2]);

        // Degenerate (collinear) triangles contribute no error updates
        let area2 = (mid.i - lo.i) * (hi.j - lo.j) - (hi.i - lo.i) * (mid.j - lo.j);
        if area2.abs() < 1e-9 {
            return;
        }

        let mut worst: Option<(usize, f64)> = None;
        if mid.j == lo.j {
            // Horizontal bottom edge: a single top half-triangle
            self.scan_half(tri, (lo, hi), (mid, hi), &mut worst);
        } else if mid.j == hi.j {
            // Horizontal top edge: a single bottom half-triangle
            self.scan_half(tri, (lo, mid), (lo, hi), &mut worst);
        } else {
            // Split at mid's row against the lo-hi edge; the two halves
            // share the midLeft/midRight chord
            let t = (mid.j - lo.j) / (hi.j - lo.j);
            let split = ImagePoint {
                i: lerp(lo.i, hi.i, t),
                j: mid.j,
                h: lerp(lo.h, hi.h, t),
            };
            self.scan_half(tri, (lo, mid), (lo, split), &mut worst);
            self.scan_half(tri, (mid, hi), (split, hi), &mut worst);
        }

        if let Some((pid, error)) = worst {
            self.tracker.claim(tri, pid, error);
        }
    }

    /// Scan one half-triangle whose two non-horizontal edges span the
    /// same rows: interpolate column bounds and heights per row, then
    /// height per covered column.
    fn scan_half(
        &mut self,
        tri: usize,
        left: (ImagePoint, ImagePoint),
        right: (ImagePoint, ImagePoint),
        worst: &mut Option<(usize, f64)>,
    ) {
        let j0 = left.0.j;
        let j1 = left.1.j;
        let row_span = j1 - j0;
        let rows = j0.round() as i64..=j1.round() as i64;

        let width = self.raster.width() as i64;
        let height = self.raster.height() as i64;

        for j in rows {
            if j < 0 || j >= height {
                continue;
            }
            let t = if row_span > 0.0 {
                (j as f64 - j0) / row_span
            } else {
                0.0
            };
            let mut il = lerp(left.0.i, left.1.i, t);
            let mut hl = lerp(left.0.h, left.1.h, t);
            let mut ir = lerp(right.0.i, right.1.i, t);
            let mut hr = lerp(right.0.h, right.1.h, t);
            if il > ir {
                std::mem::swap(&mut il, &mut ir);
                std::mem::swap(&mut hl, &mut hr);
            }

            let col_span = ir - il;
            let i_first = ((il - 1e-6).ceil() as i64).max(0);
            let i_last = ((ir + 1e-6).floor() as i64).min(width - 1);
            for i in i_first..=i_last {
                let pid = self.raster.point_id(i as usize, j as usize);
                if self.owners[pid] == PointOwner::Inserted {
                    continue;
                }
                let f = if col_span > 1e-12 {
                    ((i as f64 - il) / col_span).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let interpolated = lerp(hl, hr, f);
                let error = (self.raster.height_at(pid) as f64 - interpolated).abs();
                self.owners[pid] = PointOwner::OwnedBy(tri);
                if worst.map_or(true, |(_, e)| error > e) {
                    *worst = Some((pid, error));
                }
            }
        }
    }

    fn image_point(&self, vertex: usize) -> ImagePoint {
        let pid = self.source_ids[vertex];
        let (i, j) = self.raster.image_coords(pid);
        ImagePoint {
            i: i as f64,
            j: j as f64,
            h: self.raster.height_at(pid) as f64,
        }
    }
}
