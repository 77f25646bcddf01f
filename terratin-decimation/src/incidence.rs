//! Triangle/vertex incidence mesh
//!
//! Arena-and-index topology for the incremental triangulation: triangles
//! are vertex-id triples stored in a growable array, and each vertex keeps
//! the list of triangle ids incident to it. Triangle ids are stable for
//! the lifetime of a run; a triangle is either replaced in place (same id,
//! new triple) or new ids are appended, never recycled.

/// Triangle and vertex adjacency for an incremental triangulation.
///
/// Reference bookkeeping is split from triple rewriting on purpose:
/// [`IncidenceMesh::replace_cell`] overwrites a triangle's vertices without
/// touching the vertex incidence lists, and the caller pairs it with
/// [`IncidenceMesh::add_reference`] / [`IncidenceMesh::remove_reference`]
/// for exactly the vertices that changed.
#[derive(Debug, Clone, Default)]
pub struct IncidenceMesh {
    triangles: Vec<[usize; 3]>,
    /// vertex id -> ids of incident triangles
    incidence: Vec<Vec<usize>>,
}

impl IncidenceMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-time construction from a seed triangulation.
    pub fn initialize(&mut self, num_vertices: usize, seed: &[[usize; 3]]) {
        self.triangles.clear();
        self.incidence.clear();
        self.incidence.resize_with(num_vertices, Vec::new);
        for &triple in seed {
            self.insert_triangle(triple);
        }
    }

    /// Number of triangles (all ids in `[0, len)` are live)
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn num_vertices(&self) -> usize {
        self.incidence.len()
    }

    /// Grow the vertex table so that `vertex` is addressable.
    pub fn ensure_vertex(&mut self, vertex: usize) {
        if vertex >= self.incidence.len() {
            self.incidence.resize_with(vertex + 1, Vec::new);
        }
    }

    /// The vertex triple of a triangle, in winding order.
    #[inline]
    pub fn cell_points(&self, tri: usize) -> [usize; 3] {
        self.triangles[tri]
    }

    /// All triangle ids incident to a vertex.
    #[inline]
    pub fn point_cells(&self, vertex: usize) -> &[usize] {
        &self.incidence[vertex]
    }

    /// The 0-or-1 triangle sharing the undirected edge `(va, vb)` with
    /// `tri`. `None` signals a boundary edge.
    pub fn edge_neighbor(&self, tri: usize, va: usize, vb: usize) -> Option<usize> {
        debug_assert!(self.contains_vertex(tri, va) && self.contains_vertex(tri, vb));
        self.incidence[va]
            .iter()
            .copied()
            .find(|&t| t != tri && self.contains_vertex(t, vb))
    }

    /// Overwrite a triangle's vertex triple. The caller is responsible for
    /// the matching reference updates.
    pub fn replace_cell(&mut self, tri: usize, triple: [usize; 3]) {
        self.triangles[tri] = triple;
    }

    /// Append a new triangle and register it in each vertex's incidence list.
    pub fn insert_triangle(&mut self, triple: [usize; 3]) -> usize {
        let tri = self.triangles.len();
        self.triangles.push(triple);
        for &v in &triple {
            self.add_reference(v, tri);
        }
        tri
    }

    pub fn add_reference(&mut self, vertex: usize, tri: usize) {
        debug_assert!(!self.incidence[vertex].contains(&tri));
        self.incidence[vertex].push(tri);
    }

    pub fn remove_reference(&mut self, vertex: usize, tri: usize) {
        let list = &mut self.incidence[vertex];
        let pos = list.iter().position(|&t| t == tri);
        debug_assert!(pos.is_some(), "no reference from vertex {vertex} to triangle {tri}");
        if let Some(pos) = pos {
            list.swap_remove(pos);
        }
    }

    #[inline]
    fn contains_vertex(&self, tri: usize, vertex: usize) -> bool {
        self.triangles[tri].contains(&vertex)
    }

    /// The vertex of `tri` that is neither `va` nor `vb`.
    pub fn opposite_vertex(&self, tri: usize, va: usize, vb: usize) -> usize {
        let [a, b, c] = self.triangles[tri];
        if a != va && a != vb {
            a
        } else if b != va && b != vb {
            b
        } else {
            debug_assert!(c != va && c != vb);
            c
        }
    }
}
