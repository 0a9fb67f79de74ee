//! Exported vertices and the key used to merge identical vertices.
use glam::{Vec2, Vec3, Vec4};
use ordered_float::OrderedFloat;

/// A single vertex of a submesh in the source Z-up coordinate space.
#[derive(Debug, PartialEq, Clone)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// The first UV layer or zero if the object has no UV layers.
    pub uv: Vec2,
    /// RGBA color or opaque white if the object has no color layers.
    pub color: Vec4,
    /// Vertex group names and weights in vertex group order.
    pub bone_weights: Vec<(String, f32)>,
    /// The vertex this was created from in the source object.
    pub source: SourceVertexIndex,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SourceVertexIndex {
    pub object_index: usize,
    pub vertex_index: usize,
}

/// Identifies vertices that can share the same index.
///
/// Vertices are merged only if position, normal, UV, and color are exactly equal.
/// Bone weights and the source vertex are not compared.
/// Negative and positive zero are treated as equal.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct VertexKey {
    position: [OrderedFloat<f32>; 3],
    normal: [OrderedFloat<f32>; 3],
    uv: [OrderedFloat<f32>; 2],
    color: [OrderedFloat<f32>; 4],
}

impl VertexKey {
    pub fn new(vertex: &Vertex) -> Self {
        Self {
            position: vertex.position.to_array().map(OrderedFloat),
            normal: vertex.normal.to_array().map(OrderedFloat),
            uv: vertex.uv.to_array().map(OrderedFloat),
            color: vertex.color.to_array().map(OrderedFloat),
        }
    }
}
