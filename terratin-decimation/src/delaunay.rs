//! Delaunay insertion engine
//!
//! Point location by mesh walking, the three insertion splits (interior,
//! interior edge, boundary edge), and Lawson edge flips to restore the
//! empty-circumcircle property after each insertion.

use nalgebra::Vector2;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use terratin_core::{Error, Result};

use crate::greedy::{DecimationRun, PointOwner};

/// Flip recursion cap. A numerical safety valve against floating-point
/// cycling on near-cocircular configurations; hitting it leaves the local
/// edge as-is.
const MAX_FLIP_DEPTH: usize = 15;

/// Where a target point landed during point location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PointLocation {
    /// Strictly inside the triangle
    InTriangle { tri: usize },
    /// On the directed edge `(a, b)` of `tri`; `neighbor` is the triangle
    /// across the edge, `None` for a boundary edge.
    OnEdge {
        tri: usize,
        neighbor: Option<usize>,
        a: usize,
        b: usize,
    },
}

impl DecimationRun<'_> {
    /// Walk the triangulation from `start` until the triangle containing
    /// `target` is found.
    ///
    /// Each step tests the point against the current triangle's three
    /// edges with signed-distance half-plane tests, in an order shuffled
    /// per call (seeded by the triangle id) so degenerate configurations
    /// do not produce cyclic walks. Stepping back into the triangle just
    /// vacated, walking off the hull, or a target coincident with an
    /// existing vertex are fatal.
    pub(crate) fn find_triangle(&self, target: [f64; 2], start: usize) -> Result<PointLocation> {
        let mut tri = start;
        let mut prev = usize::MAX;
        // The walk visits each triangle at most once; anything longer is a
        // cycle the shuffled edge order failed to break.
        let max_steps = self.mesh.len() + 2;

        for _ in 0..max_steps {
            let verts = self.mesh.cell_points(tri);
            let mut order = [0usize, 1, 2];
            let mut rng = SmallRng::seed_from_u64(tri as u64);
            order.shuffle(&mut rng);

            // Most violated edge: (signed distance, edge tail, edge head)
            let mut worst: Option<(f64, usize, usize)> = None;
            for &e in &order {
                let a = verts[e];
                let b = verts[(e + 1) % 3];
                let [ax, ay] = self.vertex_xy(a);
                let [bx, by] = self.vertex_xy(b);
                let (ex, ey) = (bx - ax, by - ay);
                let (rx, ry) = (target[0] - ax, target[1] - ay);

                let radius = (rx * rx + ry * ry).sqrt();
                if radius < self.tolerance {
                    return Err(Error::Algorithm(format!(
                        "duplicate point at ({}, {}) during point location",
                        target[0], target[1]
                    )));
                }

                let edge_len = (ex * ex + ey * ey).sqrt();
                // Signed distance of target from the directed edge; the
                // interior is on the positive (left) side.
                let dist = (ex * ry - ey * rx) / edge_len;
                if worst.map_or(true, |(d, _, _)| dist < d) {
                    worst = Some((dist, a, b));
                }
            }

            let (dist, a, b) = worst.expect("triangle has three edges");
            if dist > self.tolerance {
                return Ok(PointLocation::InTriangle { tri });
            }
            if dist >= -self.tolerance {
                let neighbor = self.mesh.edge_neighbor(tri, a, b);
                return Ok(PointLocation::OnEdge {
                    tri,
                    neighbor,
                    a,
                    b,
                });
            }

            let next = self.mesh.edge_neighbor(tri, a, b).ok_or_else(|| {
                Error::Algorithm(format!(
                    "point ({}, {}) walked off the triangulation boundary",
                    target[0], target[1]
                ))
            })?;
            if next == prev {
                return Err(Error::Algorithm(format!(
                    "cyclic walk between triangles {tri} and {next}"
                )));
            }
            prev = tri;
            tri = next;
        }

        Err(Error::Algorithm(format!(
            "point location exceeded {max_steps} steps"
        )))
    }

    /// Insert a raster point into the triangulation, splitting the
    /// containing triangle or edge and restoring the Delaunay property,
    /// then re-scan-convert every triangle touching the new vertex.
    ///
    /// Inserting an already-inserted point is a no-op.
    pub(crate) fn insert_point(&mut self, pid: usize) -> Result<()> {
        let start = match self.owners[pid] {
            PointOwner::Inserted => return Ok(()),
            PointOwner::OwnedBy(tri) => tri,
            PointOwner::Unassigned => 0,
        };

        let (i, j) = self.raster.image_coords(pid);
        let target = self.raster.world_point(i, j);
        let location = self.find_triangle(target, start)?;

        self.tracker.discard(pid);
        let new = self.push_vertex(pid);
        self.mesh.ensure_vertex(new);

        match location {
            PointLocation::InTriangle { tri } => {
                // Retire (a, b, c) in place as (new, a, b); append the two
                // other children.
                let [a, b, c] = self.mesh.cell_points(tri);
                self.mesh.remove_reference(c, tri);
                self.mesh.replace_cell(tri, [new, a, b]);
                self.mesh.add_reference(new, tri);
                let t1 = self.mesh.insert_triangle([new, b, c]);
                let t2 = self.mesh.insert_triangle([new, c, a]);

                self.check_edge(new, a, b, tri, 0);
                self.check_edge(new, b, c, t1, 0);
                self.check_edge(new, c, a, t2, 0);
            }
            PointLocation::OnEdge {
                tri,
                neighbor,
                a,
                b,
            } => {
                // Split (a, b, c) along (a, b) into (new, c, a) and
                // (new, b, c); the edge neighbor, if any, splits the same
                // way across the edge.
                let c = self.mesh.opposite_vertex(tri, a, b);
                self.mesh.remove_reference(b, tri);
                self.mesh.replace_cell(tri, [new, c, a]);
                self.mesh.add_reference(new, tri);
                let t1 = self.mesh.insert_triangle([new, b, c]);

                self.check_edge(new, c, a, tri, 0);
                self.check_edge(new, b, c, t1, 0);

                if let Some(u) = neighbor {
                    let d = self.mesh.opposite_vertex(u, a, b);
                    self.mesh.remove_reference(a, u);
                    self.mesh.replace_cell(u, [new, d, b]);
                    self.mesh.add_reference(new, u);
                    let u1 = self.mesh.insert_triangle([new, a, d]);

                    self.check_edge(new, d, b, u, 0);
                    self.check_edge(new, a, d, u1, 0);
                }
            }
        }

        let touched: Vec<usize> = self.mesh.point_cells(new).to_vec();
        for tri in touched {
            self.update_triangle(tri);
        }
        Ok(())
    }

    /// Lawson flip check for the edge `(p1, p2)` of `tri`, where `tri` is
    /// wound `(new, p1, p2)`. If the neighbor's opposite vertex lies
    /// inside the circumcircle of `tri`, the shared edge is flipped to the
    /// `(new, p3)` diagonal and the two exposed edges are checked in turn.
    fn check_edge(&mut self, new: usize, p1: usize, p2: usize, tri: usize, depth: usize) {
        if depth >= MAX_FLIP_DEPTH {
            return;
        }
        let neighbor = match self.mesh.edge_neighbor(tri, p1, p2) {
            Some(n) => n,
            None => return,
        };
        let p3 = self.mesh.opposite_vertex(neighbor, p1, p2);

        let (center, r2) = match self.circumcircle(new, p1, p2) {
            Some(c) => c,
            None => return,
        };
        let opposite = Vector2::from(self.vertex_xy(p3));
        if (opposite - center).norm_squared() >= r2 * self.in_circle_tolerance {
            return;
        }

        self.mesh.remove_reference(p2, tri);
        self.mesh.replace_cell(tri, [new, p1, p3]);
        self.mesh.add_reference(p3, tri);

        self.mesh.remove_reference(p1, neighbor);
        self.mesh.replace_cell(neighbor, [new, p3, p2]);
        self.mesh.add_reference(new, neighbor);

        self.check_edge(new, p1, p3, tri, depth + 1);
        self.check_edge(new, p3, p2, neighbor, depth + 1);
    }

    /// Circumcircle of three vertices: `(center, squared radius)`, or
    /// `None` for a (near-)collinear triple.
    fn circumcircle(&self, v0: usize, v1: usize, v2: usize) -> Option<(Vector2<f64>, f64)> {
        let a = Vector2::from(self.vertex_xy(v0));
        let b = Vector2::from(self.vertex_xy(v1)) - a;
        let c = Vector2::from(self.vertex_xy(v2)) - a;

        let b2 = b.norm_squared();
        let c2 = c.norm_squared();
        let d = 2.0 * b.perp(&c);
        if d.abs() < 1e-12 * (b2 + c2) {
            return None;
        }

        let u = Vector2::new(c.y * b2 - b.y * c2, b.x * c2 - c.x * b2) / d;
        Some((a + u, u.norm_squared()))
    }
}
