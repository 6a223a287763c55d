//! Append-only vertex+index container produced by the extractor.

use crate::error::VolumeError;

/// A mesh index type. Implemented for `u16` and `u32`; `u16` additionally
/// enforces the 65,536-vertex cap the spec requires.
pub trait MeshIndex: Copy + TryFrom<usize> + Into<u32> {
    const MAX_VERTICES: usize;
}

impl MeshIndex for u16 {
    const MAX_VERTICES: usize = 65_536;
}
impl MeshIndex for u32 {
    const MAX_VERTICES: usize = u32::MAX as usize + 1;
}

/// A Marching Cubes vertex: position, normal, and a blended material.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MarchingCubesVertex<M> {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub material: M,
}

/// Append-only vertex+index container. Cleared by the extractor on entry,
/// appended to during extraction, and returned to the caller as an owned
/// value.
#[derive(Clone, Debug)]
pub struct Mesh<V, I> {
    vertices: Vec<V>,
    indices: Vec<I>,
}

impl<V, I: MeshIndex> Default for Mesh<V, I> {
    fn default() -> Self {
        Mesh {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }
}

impl<V, I: MeshIndex> Mesh<V, I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn get_vertex(&self, i: usize) -> &V {
        &self.vertices[i]
    }

    pub fn get_index(&self, i: usize) -> I {
        self.indices[i]
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn indices(&self) -> &[I] {
        &self.indices
    }

    /// Appends a vertex, returning its index. Fails with `MeshIndexOverflow`
    /// once adding it would exceed `I::MAX_VERTICES`.
    pub fn add_vertex(&mut self, vertex: V) -> Result<I, VolumeError> {
        if self.vertices.len() >= I::MAX_VERTICES {
            return Err(VolumeError::MeshIndexOverflow);
        }
        let index = I::try_from(self.vertices.len()).ok().expect("checked above");
        self.vertices.push(vertex);
        Ok(index)
    }

    pub fn add_index(&mut self, index: I) {
        self.indices.push(index);
    }

    pub fn add_triangle(&mut self, i0: I, i1: I, i2: I) {
        self.indices.push(i0);
        self.indices.push(i1);
        self.indices.push(i2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_vertex_returns_sequential_indices() {
        let mut mesh: Mesh<u32, u32> = Mesh::new();
        assert_eq!(mesh.add_vertex(10).unwrap(), 0);
        assert_eq!(mesh.add_vertex(20).unwrap(), 1);
        assert_eq!(mesh.vertex_count(), 2);
    }

    #[test]
    fn u16_mesh_overflows_at_65536_vertices() {
        let mut mesh: Mesh<(), u16> = Mesh::new();
        for _ in 0..65_536 {
            mesh.add_vertex(()).unwrap();
        }
        assert!(matches!(mesh.add_vertex(()), Err(VolumeError::MeshIndexOverflow)));
        assert_eq!(mesh.vertex_count(), 65_536);
    }

    #[test]
    fn clear_empties_both_buffers() {
        let mut mesh: Mesh<u32, u32> = Mesh::new();
        mesh.add_vertex(1).unwrap();
        mesh.add_index(0);
        mesh.clear();
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.index_count(), 0);
    }
}
