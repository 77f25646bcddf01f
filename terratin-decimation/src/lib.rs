//! Greedy terrain decimation
//!
//! Approximates a regular raster height field with a reduced Triangulated
//! Irregular Network (TIN) using greedy incremental insertion in the style
//! of Garland and Heckbert: starting from the four corner samples, the
//! raster point with the largest current interpolation error is repeatedly
//! inserted into a Delaunay triangulation until an error or triangle-count
//! criterion is met.
//!
//! The algorithm is strictly sequential; the only parallel step is the
//! optional per-vertex normal pass, which is independent of the
//! triangulation.

pub mod greedy;
pub mod incidence;
pub mod normals;

mod delaunay;
mod scan;

pub use greedy::*;
pub use incidence::*;
pub use normals::*;
