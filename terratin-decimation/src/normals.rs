//! Per-vertex normals from raster gradients
//!
//! Normals are estimated from central differences of the original height
//! field (one-sided at the grid borders), independently of the
//! triangulation. This mirrors how the decimated mesh is meant to shade:
//! against the source terrain, not the reduced faces.

use rayon::prelude::*;
use terratin_core::{HeightField, Vector3f};

/// Central-difference normal for each vertex, looked up through its
/// source raster point id.
pub fn height_field_normals(raster: &HeightField, source_ids: &[usize]) -> Vec<Vector3f> {
    let [dx, dy] = raster.spacing();
    let w = raster.width();
    let h = raster.height();

    source_ids
        .par_iter()
        .map(|&pid| {
            let (i, j) = raster.image_coords(pid);

            let i0 = i.saturating_sub(1);
            let i1 = (i + 1).min(w - 1);
            let j0 = j.saturating_sub(1);
            let j1 = (j + 1).min(h - 1);

            let dzdx = (raster.height_ij(i1, j) - raster.height_ij(i0, j)) as f64
                / ((i1 - i0) as f64 * dx);
            let dzdy = (raster.height_ij(i, j1) - raster.height_ij(i, j0)) as f64
                / ((j1 - j0) as f64 * dy);

            let normal = Vector3f::new(-dzdx as f32, -dzdy as f32, 1.0);
            normal.normalize()
        })
        .collect()
}
