//! Greedy scheduler for terrain decimation
//!
//! Owns the configuration surface and the per-run context, and drives the
//! pop-insert-rescan loop: the highest-error raster point is popped from
//! the error tracker, inserted into the Delaunay triangulation, and every
//! triangle touching the new vertex is re-scan-converted to refresh point
//! ownership and errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use terratin_core::{HeightField, Point3f, Result, TriangleMesh};

use crate::incidence::IncidenceMesh;
use crate::normals::height_field_normals;
use crate::scan::ErrorTracker;

/// Termination criterion for the greedy loop.
///
/// Each variant owns its own configuration: a target triangle count, a
/// fractional reduction versus full resolution, or an error threshold
/// (absolute, or relative to the raster bounding-box diagonal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorMeasure {
    /// Stop when the triangle count reaches the target (clamped to the
    /// full-resolution maximum `2*(W-1)*(H-1)`).
    NumberOfTriangles(usize),
    /// Stop when `1 - current/max <= reduction`, `reduction` in [0, 1].
    SpecifiedReduction(f64),
    /// Stop when the popped error drops to the threshold or below.
    AbsoluteError(f64),
    /// Like [`ErrorMeasure::AbsoluteError`], but the threshold is a
    /// fraction of the bounding-box diagonal length.
    RelativeError(f64),
}

impl ErrorMeasure {
    /// Stop predicate, evaluated against the entry just popped from the
    /// error tracker.
    pub fn should_stop(
        &self,
        popped_error: f64,
        current_triangles: usize,
        max_triangles: usize,
        diagonal: f64,
    ) -> bool {
        match *self {
            ErrorMeasure::NumberOfTriangles(target) => {
                current_triangles >= target.min(max_triangles)
            }
            ErrorMeasure::SpecifiedReduction(reduction) => {
                1.0 - current_triangles as f64 / max_triangles as f64 <= reduction
            }
            ErrorMeasure::AbsoluteError(threshold) => popped_error <= threshold,
            ErrorMeasure::RelativeError(threshold) => popped_error / diagonal <= threshold,
        }
    }
}

/// Decimation output: the TIN plus the raster point id of every vertex,
/// in insertion order (the four corners first). The id map lets callers
/// copy further per-point attributes onto the mesh.
#[derive(Debug, Clone)]
pub struct TinMesh {
    pub mesh: TriangleMesh,
    pub source_ids: Vec<usize>,
}

/// Greedy terrain decimation of a raster height field into a reduced TIN.
///
/// Starts from the four corner samples and two triangles, then repeatedly
/// inserts the raster point with the largest interpolation error into an
/// incrementally maintained Delaunay triangulation until the configured
/// [`ErrorMeasure`] is satisfied.
#[derive(Debug, Clone)]
pub struct GreedyTerrainDecimation {
    /// Termination criterion for the greedy loop
    pub error_measure: ErrorMeasure,
    /// When false, all grid-boundary points are force-inserted before the
    /// error-driven loop begins, excluding them from simplification.
    pub boundary_vertex_deletion: bool,
    /// Attach per-vertex normals from central-difference raster gradients
    pub compute_normals: bool,
    /// Relative factor applied to the squared circumradius in the
    /// edge-flip in-circle test; slightly below 1 so near-cocircular
    /// configurations do not flip.
    pub in_circle_tolerance: f64,
    /// Cooperative cancellation flag, polled between insertions only
    pub abort: Option<Arc<AtomicBool>>,
    /// How many insertions pass between abort polls
    pub abort_poll_interval: usize,
}

impl Default for GreedyTerrainDecimation {
    fn default() -> Self {
        Self {
            error_measure: ErrorMeasure::SpecifiedReduction(0.9),
            boundary_vertex_deletion: true,
            compute_normals: false,
            in_circle_tolerance: 0.999_999_999_999,
            abort: None,
            abort_poll_interval: 128,
        }
    }
}

impl GreedyTerrainDecimation {
    pub fn new(error_measure: ErrorMeasure) -> Self {
        Self {
            error_measure,
            ..Self::default()
        }
    }

    /// Decimate a height field into a TIN.
    ///
    /// Fails with `Error::InvalidData` on a malformed raster and with
    /// `Error::Algorithm` on geometric degeneracies (duplicate points,
    /// cyclic point-location walks); both short-circuit the whole run.
    pub fn decimate(&self, raster: &HeightField) -> Result<TinMesh> {
        raster.validate().map_err(|e| {
            log::error!("terrain decimation rejected its input: {e}");
            e
        })?;

        let mut run = DecimationRun::new(raster, self.in_circle_tolerance);
        run.initialize();

        if !self.boundary_vertex_deletion {
            run.insert_boundary_points().map_err(|e| {
                log::error!("terrain decimation failed in boundary pre-pass: {e}");
                e
            })?;
        }

        let max_triangles = raster.max_triangles();
        let diagonal = raster.diagonal();
        let poll_interval = self.abort_poll_interval.max(1);
        let mut inserted = 0usize;
        let mut drained = true;

        while let Some((pid, error)) = run.tracker.pop() {
            if self
                .error_measure
                .should_stop(error, run.mesh.len(), max_triangles, diagonal)
            {
                drained = false;
                break;
            }
            if let Some(flag) = &self.abort {
                if inserted % poll_interval == 0 && flag.load(Ordering::Relaxed) {
                    log::warn!("terrain decimation aborted after {inserted} insertions");
                    drained = false;
                    break;
                }
            }
            run.insert_point(pid).map_err(|e| {
                log::error!("terrain decimation failed after {inserted} insertions: {e}");
                e
            })?;
            inserted += 1;
        }

        if drained {
            log::debug!("error queue drained after {inserted} insertions");
        }

        Ok(self.finish(raster, run))
    }

    fn finish(&self, raster: &HeightField, run: DecimationRun<'_>) -> TinMesh {
        let faces = (0..run.mesh.len()).map(|t| run.mesh.cell_points(t)).collect();
        let mut mesh = TriangleMesh::from_vertices_and_faces(run.vertices, faces);

        if let Some(colors) = &raster.colors {
            if colors.len() == raster.len() {
                mesh.set_colors(run.source_ids.iter().map(|&id| colors[id]).collect());
            }
        }
        if self.compute_normals {
            mesh.set_normals(height_field_normals(raster, &run.source_ids));
        }

        TinMesh {
            mesh,
            source_ids: run.source_ids,
        }
    }
}

/// Ownership state of a raster point during a run.
///
/// A point starts `Unassigned`, is claimed by whichever triangle last
/// scan-converted it, and transitions to `Inserted` exactly once when the
/// greedy loop (or the boundary pre-pass) selects it. Inserted points are
/// never re-examined by scan conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PointOwner {
    Unassigned,
    OwnedBy(usize),
    Inserted,
}

/// All per-run mutable state, bundled so the insertion engine and the
/// scan converter can share it through `&mut self`. Lifetime is a single
/// decimation run, strictly single-threaded.
pub(crate) struct DecimationRun<'a> {
    pub(crate) raster: &'a HeightField,
    pub(crate) mesh: IncidenceMesh,
    pub(crate) tracker: ErrorTracker,
    pub(crate) owners: Vec<PointOwner>,
    /// One 3-D point per inserted raster point, in insertion order
    pub(crate) vertices: Vec<Point3f>,
    /// vertex id -> source raster point id
    pub(crate) source_ids: Vec<usize>,
    /// Point-location tolerance, tuned to the raster spacing
    pub(crate) tolerance: f64,
    pub(crate) in_circle_tolerance: f64,
}

impl<'a> DecimationRun<'a> {
    pub(crate) fn new(raster: &'a HeightField, in_circle_tolerance: f64) -> Self {
        Self {
            raster,
            mesh: IncidenceMesh::new(),
            tracker: ErrorTracker::new(),
            owners: vec![PointOwner::Unassigned; raster.len()],
            vertices: Vec::new(),
            source_ids: Vec::new(),
            tolerance: 0.01 * raster.spacing()[0],
            in_circle_tolerance,
        }
    }

    /// Seed the triangulation with the four corner vertices and two
    /// triangles, and scan-convert both.
    pub(crate) fn initialize(&mut self) {
        let w = self.raster.width();
        let h = self.raster.height();
        let corners = [
            self.raster.point_id(0, 0),
            self.raster.point_id(w - 1, 0),
            self.raster.point_id(w - 1, h - 1),
            self.raster.point_id(0, h - 1),
        ];
        for &pid in &corners {
            self.push_vertex(pid);
        }
        self.mesh.initialize(4, &[[0, 1, 2], [0, 2, 3]]);
        self.update_triangle(0);
        self.update_triangle(1);
    }

    /// Force-insert every perimeter point that is not already a vertex.
    pub(crate) fn insert_boundary_points(&mut self) -> Result<()> {
        let w = self.raster.width();
        let h = self.raster.height();
        for i in 0..w {
            self.insert_point(self.raster.point_id(i, 0))?;
            self.insert_point(self.raster.point_id(i, h - 1))?;
        }
        for j in 1..h - 1 {
            self.insert_point(self.raster.point_id(0, j))?;
            self.insert_point(self.raster.point_id(w - 1, j))?;
        }
        Ok(())
    }

    /// Append a mesh vertex for a raster point and mark it inserted.
    pub(crate) fn push_vertex(&mut self, pid: usize) -> usize {
        let (i, j) = self.raster.image_coords(pid);
        let [x, y] = self.raster.world_point(i, j);
        let z = self.raster.height_at(pid);
        let vertex = self.vertices.len();
        self.vertices.push(Point3f::new(x as f32, y as f32, z));
        self.source_ids.push(pid);
        self.owners[pid] = PointOwner::Inserted;
        vertex
    }

    /// Exact world-space `(x, y)` of a mesh vertex, recovered through its
    /// source raster point.
    #[inline]
    pub(crate) fn vertex_xy(&self, vertex: usize) -> [f64; 2] {
        let (i, j) = self.raster.image_coords(self.source_ids[vertex]);
        self.raster.world_point(i, j)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashSet;

    fn make_field(w: usize, h: usize, f: impl Fn(usize, usize) -> f32) -> HeightField {
        let mut samples = Vec::with_capacity(w * h);
        for j in 0..h {
            for i in 0..w {
                samples.push(f(i, j));
            }
        }
        HeightField::new(w, h, [0.0, 0.0], [1.0, 1.0], samples).unwrap()
    }

    fn make_sine_field(w: usize, h: usize) -> HeightField {
        make_field(w, h, |i, j| {
            let fx = i as f32 / (w - 1) as f32 * std::f32::consts::PI;
            let fy = j as f32 / (h - 1) as f32 * std::f32::consts::PI;
            fx.sin() * fy.sin() * 4.0
        })
    }

    /// Linearly interpolate the TIN height at a raster point by searching
    /// for the containing face (barycentric test with a small slack).
    fn tin_height_at(tin: &TinMesh, x: f64, y: f64) -> Option<f64> {
        for face in &tin.mesh.faces {
            let a = tin.mesh.vertices[face[0]];
            let b = tin.mesh.vertices[face[1]];
            let c = tin.mesh.vertices[face[2]];
            let (ax, ay) = (a.x as f64, a.y as f64);
            let (bx, by) = (b.x as f64, b.y as f64);
            let (cx, cy) = (c.x as f64, c.y as f64);
            let det = (bx - ax) * (cy - ay) - (cx - ax) * (by - ay);
            if det.abs() < 1e-12 {
                continue;
            }
            let wa = ((bx - x) * (cy - y) - (cx - x) * (by - y)) / det;
            let wb = ((cx - x) * (ay - y) - (ax - x) * (cy - y)) / det;
            let wc = 1.0 - wa - wb;
            if wa >= -1e-9 && wb >= -1e-9 && wc >= -1e-9 {
                return Some(wa * a.z as f64 + wb * b.z as f64 + wc * c.z as f64);
            }
        }
        None
    }

    /// Hull boundary vertices of a TIN over the full raster rectangle are
    /// exactly the inserted perimeter points.
    fn perimeter_vertex_count(raster: &HeightField, tin: &TinMesh) -> usize {
        let w = raster.width();
        let h = raster.height();
        tin.source_ids
            .iter()
            .filter(|&&id| {
                let (i, j) = raster.image_coords(id);
                i == 0 || i == w - 1 || j == 0 || j == h - 1
            })
            .count()
    }

    #[test]
    fn test_flat_field_stops_after_initial_triangles() {
        let raster = make_field(3, 3, |_, _| 0.0);
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::AbsoluteError(0.01));
        let tin = decimator.decimate(&raster).unwrap();
        assert_eq!(tin.mesh.vertex_count(), 4);
        assert_eq!(tin.mesh.face_count(), 2);
    }

    #[test]
    fn test_single_spike_inserts_center_only() {
        let raster = make_field(3, 3, |i, j| if i == 1 && j == 1 { 10.0 } else { 0.0 });
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::AbsoluteError(0.5));
        let tin = decimator.decimate(&raster).unwrap();
        assert_eq!(tin.mesh.vertex_count(), 5);
        assert_eq!(tin.mesh.face_count(), 4);
        assert_eq!(tin.source_ids[4], raster.point_id(1, 1));

        // Zero residual at all 9 raster points
        for j in 0..3 {
            for i in 0..3 {
                let [x, y] = raster.world_point(i, j);
                let z = tin_height_at(&tin, x, y).expect("point must be covered");
                assert_relative_eq!(
                    z,
                    raster.height_ij(i, j) as f64,
                    epsilon = 1e-6
                );
            }
        }
    }

    #[test]
    fn test_full_resolution_round_trip() {
        let raster = make_sine_field(5, 4);
        let target = raster.max_triangles();
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::NumberOfTriangles(target));
        let tin = decimator.decimate(&raster).unwrap();
        assert_eq!(tin.mesh.vertex_count(), raster.len());
        assert_eq!(tin.mesh.face_count(), target);

        // Every raster point inserted exactly once
        let unique: HashSet<usize> = tin.source_ids.iter().copied().collect();
        assert_eq!(unique.len(), raster.len());
    }

    #[test]
    fn test_triangle_count_law() {
        // Euler relation for a triangulation of the full rectangle:
        // faces == 2*vertices - 2 - perimeter_vertices
        let raster = make_sine_field(9, 7);
        for measure in [
            ErrorMeasure::AbsoluteError(0.4),
            ErrorMeasure::NumberOfTriangles(40),
            ErrorMeasure::SpecifiedReduction(0.5),
        ] {
            let tin = GreedyTerrainDecimation::new(measure)
                .decimate(&raster)
                .unwrap();
            let n = tin.mesh.vertex_count();
            let b = perimeter_vertex_count(&raster, &tin);
            assert_eq!(
                tin.mesh.face_count(),
                2 * n - 2 - b,
                "triangle count law violated for {measure:?}"
            );
        }
    }

    #[test]
    fn test_number_of_triangles_clamped() {
        let raster = make_sine_field(4, 4);
        let decimator =
            GreedyTerrainDecimation::new(ErrorMeasure::NumberOfTriangles(usize::MAX));
        let tin = decimator.decimate(&raster).unwrap();
        assert_eq!(tin.mesh.face_count(), raster.max_triangles());
    }

    #[test]
    fn test_specified_reduction() {
        let raster = make_sine_field(9, 9);
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::SpecifiedReduction(0.5));
        let tin = decimator.decimate(&raster).unwrap();
        let achieved = 1.0 - tin.mesh.face_count() as f64 / raster.max_triangles() as f64;
        assert!(achieved <= 0.5, "stopped too early: reduction {achieved}");
        assert!(tin.mesh.face_count() < raster.max_triangles());
    }

    #[test]
    fn test_absolute_error_bound_holds_everywhere() {
        let raster = make_sine_field(8, 8);
        let threshold = 0.5f64;
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::AbsoluteError(threshold));
        let tin = decimator.decimate(&raster).unwrap();
        for j in 0..raster.height() {
            for i in 0..raster.width() {
                let [x, y] = raster.world_point(i, j);
                let z = tin_height_at(&tin, x, y).expect("point must be covered");
                let residual = (z - raster.height_ij(i, j) as f64).abs();
                assert!(
                    residual <= threshold + 1e-6,
                    "residual {residual} at ({i}, {j}) exceeds threshold"
                );
            }
        }
    }

    #[test]
    fn test_relative_error_measure() {
        let raster = make_sine_field(8, 8);
        let fraction = 0.02f64;
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::RelativeError(fraction));
        let tin = decimator.decimate(&raster).unwrap();
        let threshold = fraction * raster.diagonal();
        for j in 0..raster.height() {
            for i in 0..raster.width() {
                let [x, y] = raster.world_point(i, j);
                let z = tin_height_at(&tin, x, y).expect("point must be covered");
                assert!((z - raster.height_ij(i, j) as f64).abs() <= threshold + 1e-6);
            }
        }
    }

    #[test]
    fn test_boundary_pre_pass() {
        // With a large threshold the loop stops at the first pop, so the
        // output contains exactly the force-inserted perimeter points.
        let raster = make_sine_field(4, 4);
        let mut decimator = GreedyTerrainDecimation::new(ErrorMeasure::AbsoluteError(1e9));
        decimator.boundary_vertex_deletion = false;
        let tin = decimator.decimate(&raster).unwrap();
        assert_eq!(tin.mesh.vertex_count(), 12);
        assert_eq!(perimeter_vertex_count(&raster, &tin), 12);
    }

    #[test]
    fn test_delaunay_invariant() {
        let raster = make_sine_field(8, 8);
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::AbsoluteError(0.2));
        let tin = decimator.decimate(&raster).unwrap();
        for face in &tin.mesh.faces {
            let a = tin.mesh.vertices[face[0]];
            let b = tin.mesh.vertices[face[1]];
            let c = tin.mesh.vertices[face[2]];
            let (ax, ay) = (a.x as f64, a.y as f64);
            let (bx, by) = (b.x as f64 - ax, b.y as f64 - ay);
            let (cx, cy) = (c.x as f64 - ax, c.y as f64 - ay);
            let d = 2.0 * (bx * cy - by * cx);
            assert!(d.abs() > 1e-12, "degenerate face in output");
            let b2 = bx * bx + by * by;
            let c2 = cx * cx + cy * cy;
            let ux = (cy * b2 - by * c2) / d;
            let uy = (bx * c2 - cx * b2) / d;
            let r2 = ux * ux + uy * uy;

            for (v, vertex) in tin.mesh.vertices.iter().enumerate() {
                if face.contains(&v) {
                    continue;
                }
                let dx = vertex.x as f64 - (ax + ux);
                let dy = vertex.y as f64 - (ay + uy);
                let dist2 = dx * dx + dy * dy;
                assert!(
                    dist2 >= r2 * 0.999_999,
                    "vertex {v} strictly inside circumcircle of {face:?}"
                );
            }
        }
    }

    #[test]
    fn test_insertion_idempotent() {
        let raster = make_field(3, 3, |i, j| (i * j) as f32);
        let mut run = DecimationRun::new(&raster, 0.999_999_999_999);
        run.initialize();

        let center = raster.point_id(1, 1);
        run.insert_point(center).unwrap();
        let triangles = run.mesh.len();
        let vertices = run.vertices.len();
        let queued = run.tracker.len();

        run.insert_point(center).unwrap();
        assert_eq!(run.mesh.len(), triangles);
        assert_eq!(run.vertices.len(), vertices);
        assert_eq!(run.tracker.len(), queued);
    }

    #[test]
    fn test_abort_returns_partial_mesh() {
        let raster = make_sine_field(16, 16);
        let flag = Arc::new(AtomicBool::new(true));
        let mut decimator =
            GreedyTerrainDecimation::new(ErrorMeasure::NumberOfTriangles(usize::MAX));
        decimator.abort = Some(flag);
        decimator.abort_poll_interval = 1;
        let tin = decimator.decimate(&raster).unwrap();
        // Aborted before any insertion: the corner mesh comes back intact
        assert_eq!(tin.mesh.vertex_count(), 4);
        assert_eq!(tin.mesh.face_count(), 2);
    }

    #[test]
    fn test_normals_on_flat_field() {
        let raster = make_field(4, 4, |_, _| 3.0);
        let mut decimator = GreedyTerrainDecimation::new(ErrorMeasure::AbsoluteError(0.01));
        decimator.compute_normals = true;
        let tin = decimator.decimate(&raster).unwrap();
        let normals = tin.mesh.normals.as_ref().expect("normals requested");
        assert_eq!(normals.len(), tin.mesh.vertex_count());
        for n in normals {
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_colors_copied_to_vertices() {
        let mut raster = make_field(3, 3, |i, j| if i == 1 && j == 1 { 5.0 } else { 0.0 });
        raster.colors = Some(
            (0..raster.len())
                .map(|id| [id as u8, 0, 255 - id as u8])
                .collect(),
        );
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::AbsoluteError(0.5));
        let tin = decimator.decimate(&raster).unwrap();
        let colors = tin.mesh.colors.as_ref().expect("colors copied");
        assert_eq!(colors.len(), tin.mesh.vertex_count());
        for (v, &id) in tin.source_ids.iter().enumerate() {
            assert_eq!(colors[v][0], id as u8);
        }
    }

    #[test]
    fn test_insertion_order_starts_with_corners() {
        let raster = make_sine_field(5, 5);
        let decimator = GreedyTerrainDecimation::new(ErrorMeasure::SpecifiedReduction(0.5));
        let tin = decimator.decimate(&raster).unwrap();
        assert_eq!(tin.source_ids[0], raster.point_id(0, 0));
        assert_eq!(tin.source_ids[1], raster.point_id(4, 0));
        assert_eq!(tin.source_ids[2], raster.point_id(4, 4));
        assert_eq!(tin.source_ids[3], raster.point_id(0, 4));
    }
}
