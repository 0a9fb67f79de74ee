//! Sparse vertex offsets for shape keys.
use glam::Vec3;
use indexmap::IndexSet;

use crate::{error::EncodePosesError, geometry::Submesh, scene::SceneObject};

/// A named morph target for a single submesh.
#[derive(Debug, PartialEq, Clone)]
pub struct Pose {
    pub name: String,
    /// The index of the submesh these offsets apply to.
    pub submesh_index: usize,
    /// Offsets for vertices that move in this pose ordered by vertex index.
    pub offsets: Vec<PoseOffset>,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PoseOffset {
    /// The index of the vertex in the submesh.
    pub index: usize,
    /// The offset from the relative key in the source Z-up space.
    pub offset: Vec3,
}

/// Compute the offset of each shape key from its relative key for the vertices of `submesh`.
///
/// Only vertices with a non zero offset are included.
/// Keys without a relative key and keys that move no vertices are skipped.
#[tracing::instrument(skip_all)]
pub fn encode_poses(
    submesh_index: usize,
    submesh: &Submesh,
    objects: &[SceneObject],
) -> Result<Vec<Pose>, EncodePosesError> {
    // Shape keys are defined per object, so use names from every contributing object.
    let object_indices: IndexSet<_> = submesh
        .vertices
        .iter()
        .map(|v| v.source.object_index)
        .collect();
    let names: IndexSet<&str> = object_indices
        .iter()
        .filter_map(|i| objects.get(*i))
        .flat_map(|o| o.shape_keys.iter())
        .filter(|k| k.relative_key.is_some())
        .map(|k| k.name.as_str())
        .collect();

    let mut poses = Vec::new();
    for name in names {
        let mut offsets = Vec::new();
        for (index, vertex) in submesh.vertices.iter().enumerate() {
            let Some(object) = objects.get(vertex.source.object_index) else {
                continue;
            };
            if let Some(offset) = shape_key_offset(object, name, vertex.source.vertex_index)? {
                if offset != Vec3::ZERO {
                    offsets.push(PoseOffset { index, offset });
                }
            }
        }

        if !offsets.is_empty() {
            poses.push(Pose {
                name: name.to_string(),
                submesh_index,
                offsets,
            });
        }
    }

    Ok(poses)
}

fn shape_key_offset(
    object: &SceneObject,
    name: &str,
    vertex: usize,
) -> Result<Option<Vec3>, EncodePosesError> {
    let Some(key) = object.shape_key(name) else {
        return Ok(None);
    };
    let Some(relative_name) = &key.relative_key else {
        return Ok(None);
    };

    let relative = object.shape_key(relative_name).ok_or_else(|| {
        EncodePosesError::MissingRelativeKey {
            object: object.name.clone(),
            key: key.name.clone(),
            relative_key: relative_name.clone(),
        }
    })?;

    let missing_position = |key: &str| EncodePosesError::MissingPosition {
        object: object.name.clone(),
        key: key.to_string(),
        vertex,
    };
    let position = key
        .positions
        .get(vertex)
        .ok_or_else(|| missing_position(&key.name))?;
    let base = relative
        .positions
        .get(vertex)
        .ok_or_else(|| missing_position(&relative.name))?;

    let offset = *position - *base;
    if !offset.is_finite() {
        let key = if position.is_finite() { relative } else { key };
        return Err(EncodePosesError::NonFinite {
            object: object.name.clone(),
            key: key.name.clone(),
            vertex,
        });
    }
    Ok(Some(offset))
}
