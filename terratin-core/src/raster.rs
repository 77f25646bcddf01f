//! Regular raster height fields
//!
//! A `HeightField` is a W x H grid of elevation samples with a world-space
//! origin and spacing. Raster points are addressed either by `(i, j)` grid
//! coordinates or by a flat row-major point id in `[0, W*H)`.

use crate::error::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A 2-D regular raster of elevation samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightField {
    width: usize,
    height: usize,
    origin: [f64; 2],
    spacing: [f64; 2],
    /// Samples indexed as `heights[[j, i]]` (row, column)
    heights: Array2<f32>,
    /// Optional per-point colors, row-major, one entry per raster point
    pub colors: Option<Vec<[u8; 3]>>,
}

impl HeightField {
    /// Create a height field from row-major samples.
    ///
    /// Fails with [`Error::InvalidData`] when the grid is not 2-D (either
    /// dimension < 2), when the sample count does not match `width * height`,
    /// or when a spacing component is not strictly positive.
    pub fn new(
        width: usize,
        height: usize,
        origin: [f64; 2],
        spacing: [f64; 2],
        samples: Vec<f32>,
    ) -> Result<Self> {
        if width < 2 || height < 2 {
            return Err(Error::InvalidData(format!(
                "height field must be 2-D, got {}x{}",
                width, height
            )));
        }
        if samples.len() != width * height {
            return Err(Error::InvalidData(format!(
                "expected {} samples for a {}x{} grid, got {}",
                width * height,
                width,
                height,
                samples.len()
            )));
        }
        if spacing[0] <= 0.0 || spacing[1] <= 0.0 {
            return Err(Error::InvalidData(format!(
                "spacing must be positive, got [{}, {}]",
                spacing[0], spacing[1]
            )));
        }
        let heights = Array2::from_shape_vec((height, width), samples)
            .map_err(|e| Error::InvalidData(e.to_string()))?;
        Ok(Self {
            width,
            height,
            origin,
            spacing,
            heights,
            colors: None,
        })
    }

    /// Grid width (number of columns)
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height (number of rows)
    pub fn height(&self) -> usize {
        self.height
    }

    /// World-space origin `(x, y)` of grid point `(0, 0)`
    pub fn origin(&self) -> [f64; 2] {
        self.origin
    }

    /// World-space grid spacing `(dx, dy)`
    pub fn spacing(&self) -> [f64; 2] {
        self.spacing
    }

    /// Total number of raster points
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Whether the raster has no points
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// World-space `(x, y)` of grid point `(i, j)`
    #[inline]
    pub fn world_point(&self, i: usize, j: usize) -> [f64; 2] {
        [
            self.origin[0] + i as f64 * self.spacing[0],
            self.origin[1] + j as f64 * self.spacing[1],
        ]
    }

    /// Grid coordinates `(i, j)` of a row-major point id
    #[inline]
    pub fn image_coords(&self, id: usize) -> (usize, usize) {
        (id % self.width, id / self.width)
    }

    /// Row-major point id of grid point `(i, j)`
    #[inline]
    pub fn point_id(&self, i: usize, j: usize) -> usize {
        j * self.width + i
    }

    /// Elevation sample at a row-major point id
    #[inline]
    pub fn height_at(&self, id: usize) -> f32 {
        let (i, j) = self.image_coords(id);
        self.heights[[j, i]]
    }

    /// Elevation sample at grid point `(i, j)`
    #[inline]
    pub fn height_ij(&self, i: usize, j: usize) -> f32 {
        self.heights[[j, i]]
    }

    /// Re-check the construction invariants.
    ///
    /// [`HeightField::new`] enforces these already; algorithm entry points
    /// call this so deserialized fields get the same precondition failure.
    pub fn validate(&self) -> Result<()> {
        if self.width < 2 || self.height < 2 {
            return Err(Error::InvalidData(format!(
                "height field must be 2-D, got {}x{}",
                self.width, self.height
            )));
        }
        if self.heights.len() != self.width * self.height {
            return Err(Error::InvalidData(
                "sample count does not match grid dimensions".to_string(),
            ));
        }
        if self.spacing[0] <= 0.0 || self.spacing[1] <= 0.0 {
            return Err(Error::InvalidData("spacing must be positive".to_string()));
        }
        Ok(())
    }

    /// Triangle count of the full-resolution tessellation: `2*(W-1)*(H-1)`
    pub fn max_triangles(&self) -> usize {
        2 * (self.width - 1) * (self.height - 1)
    }

    /// World-space bounding box `(min, max)` including the height extent
    pub fn bounds(&self) -> ([f64; 3], [f64; 3]) {
        let mut zmin = f64::INFINITY;
        let mut zmax = f64::NEG_INFINITY;
        for &h in self.heights.iter() {
            let h = h as f64;
            zmin = zmin.min(h);
            zmax = zmax.max(h);
        }
        let [x1, y1] = self.world_point(self.width - 1, self.height - 1);
        (
            [self.origin[0], self.origin[1], zmin],
            [x1, y1, zmax],
        )
    }

    /// Length of the bounding-box diagonal, used by relative error measures
    pub fn diagonal(&self) -> f64 {
        let (min, max) = self.bounds();
        let dx = max[0] - min[0];
        let dy = max[1] - min[1];
        let dz = max[2] - min[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}
