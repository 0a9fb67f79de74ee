//! Per vertex tangents and binormals from triangle UV gradients.
use glam::{Vec2, Vec3};

use crate::error::TangentError;

/// Calculate a tangent for each vertex from the triangle list `indices`.
///
/// Each triangle assigns its tangent to all three of its vertices.
/// Vertices shared by multiple triangles keep the tangent of the last triangle.
/// Degenerate triangles produce a zero tangent.
#[tracing::instrument(skip_all)]
pub fn calculate_tangents(
    indices: &[u32],
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
) -> Result<Vec<Vec3>, TangentError> {
    let vertex_count = positions.len().min(normals.len()).min(uvs.len());
    let mut tangents = vec![Vec3::ZERO; positions.len()];

    for (triangle, face) in indices.chunks_exact(3).enumerate() {
        let [a, b, c] = [face[0], face[1], face[2]].map(|i| i as usize);
        if let Some(vertex) = [a, b, c].into_iter().find(|v| *v >= vertex_count) {
            return Err(TangentError::IndexOutOfRange {
                triangle,
                vertex,
                vertex_count,
            });
        }

        let tangent = triangle_tangent(
            [positions[a], positions[b], positions[c]],
            normals[a],
            [uvs[a], uvs[b], uvs[c]],
        );
        if !tangent.is_finite() {
            return Err(TangentError::NonFinite { triangle });
        }

        tangents[a] = tangent;
        tangents[b] = tangent;
        tangents[c] = tangent;
    }

    Ok(tangents)
}

/// Calculate the cross product `normal x tangent` for each vertex.
pub fn calculate_binormals(normals: &[Vec3], tangents: &[Vec3]) -> Vec<Vec3> {
    normals
        .iter()
        .zip(tangents)
        .map(|(n, t)| n.cross(*t))
        .collect()
}

fn triangle_tangent(positions: [Vec3; 3], normal: Vec3, uvs: [Vec2; 3]) -> Vec3 {
    // Keep the edges in the plane perpendicular to the first vertex normal.
    let mut ab = positions[1] - positions[0];
    let mut ac = positions[2] - positions[0];
    ab -= normal * ab.dot(normal);
    ac -= normal * ac.dot(normal);

    let ab_uv = uvs[1] - uvs[0];
    let ac_uv = uvs[2] - uvs[0];
    let (mut abv, mut acv) = (ab_uv.y, ac_uv.y);

    // Flip mirrored UVs to get consistent handedness.
    if acv * ab_uv.x > abv * ac_uv.x {
        acv = -acv;
        abv = -abv;
    }

    let tangent = ac * abv - ab * acv;
    let length = tangent.length();
    if length != 0.0 {
        tangent / length
    } else {
        tangent
    }
}
