//! Core data structures for terratin
//!
//! This crate provides the fundamental types shared by the terratin
//! workspace: point and vector aliases, triangle meshes, regular raster
//! height fields, and the common error type.

pub mod error;
pub mod mesh;
pub mod point;
pub mod raster;

pub use error::*;
pub use mesh::*;
pub use point::*;
pub use raster::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
