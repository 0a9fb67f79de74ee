//! Triangulation and per submesh vertex deduplication.
use glam::{Vec2, Vec3, Vec4};
use indexmap::{IndexMap, map::Entry};
use log::{debug, warn};

use crate::{
    SubmeshGrouping,
    error::{CollectGeometryError, ExportWarning},
    scene::{ColorLayer, Face, SceneObject},
    vertex::{SourceVertexIndex, Vertex, VertexKey},
};

/// The material name used for empty material slots and objects without materials.
pub const MISSING_MATERIAL: &str = "_missing_material_";

/// Vertex group weights at or below this value are not exported.
pub const MIN_BONE_WEIGHT: f32 = 0.01;

/// The vertex count above which index buffers require 32 bit indices.
pub const MAX_16BIT_VERTEX_COUNT: usize = 65535;

/// Deduplicated geometry sharing a single material.
#[derive(Debug, PartialEq, Clone)]
pub struct Submesh {
    pub material: String,
    /// Unique vertices in the order they were first referenced.
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into [vertices](#structfield.vertices).
    pub indices: Vec<u32>,
    /// `true` if any contributing object has a UV layer.
    pub has_uvs: bool,
    /// `true` if any contributing object supplied vertex colors.
    pub has_colors: bool,
    pub tangents: Option<Vec<Vec3>>,
    pub binormals: Option<Vec<Vec3>>,
}

impl Submesh {
    pub fn use_32bit_indices(&self) -> bool {
        self.vertices.len() > MAX_16BIT_VERTEX_COUNT
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    pub fn normals(&self) -> Vec<Vec3> {
        self.vertices.iter().map(|v| v.normal).collect()
    }

    pub fn uvs(&self) -> Vec<Vec2> {
        self.vertices.iter().map(|v| v.uv).collect()
    }
}

/// Builds submeshes by visiting the faces of each object in order.
#[derive(Debug)]
pub struct GeometryCollector {
    grouping: SubmeshGrouping,
    export_colors: bool,
    submeshes: IndexMap<String, SubmeshBuilder>,
    warnings: Vec<ExportWarning>,
}

#[derive(Debug)]
struct SubmeshBuilder {
    material: String,
    vertices: Vec<Vertex>,
    // Vertices are only shared between faces of the same object.
    vertex_indices: IndexMap<(usize, VertexKey), u32, ahash::RandomState>,
    indices: Vec<u32>,
    has_uvs: bool,
    has_colors: bool,
}

impl SubmeshBuilder {
    fn new(material: String) -> Self {
        Self {
            material,
            vertices: Vec::new(),
            vertex_indices: IndexMap::default(),
            indices: Vec::new(),
            has_uvs: false,
            has_colors: false,
        }
    }

    fn add_vertex(&mut self, vertex: Vertex) {
        let key = (vertex.source.object_index, VertexKey::new(&vertex));
        let index = match self.vertex_indices.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let index = self.vertices.len() as u32;
                self.vertices.push(vertex);
                *entry.insert(index)
            }
        };
        self.indices.push(index);
    }

    fn build(self) -> Submesh {
        Submesh {
            material: self.material,
            vertices: self.vertices,
            indices: self.indices,
            has_uvs: self.has_uvs,
            has_colors: self.has_colors,
            tangents: None,
            binormals: None,
        }
    }
}

// The layers supplying RGB and alpha for an object.
struct ColorSource<'a> {
    rgb: Option<&'a ColorLayer>,
    alpha: Option<&'a ColorLayer>,
}

impl<'a> ColorSource<'a> {
    fn new(object: &'a SceneObject) -> Option<Self> {
        let active = object.color_layers.get(object.active_color_layer?)?;
        let alpha = object.color_layers.iter().rfind(|l| l.is_alpha());

        // Use the first other layer for color if the alpha layer is active.
        let rgb = if active.is_alpha() {
            object.color_layers.iter().find(|l| !l.is_alpha())
        } else {
            Some(active)
        };

        Some(Self { rgb, alpha })
    }
}

impl GeometryCollector {
    pub fn new(grouping: SubmeshGrouping, export_colors: bool) -> Self {
        Self {
            grouping,
            export_colors,
            submeshes: IndexMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Triangulate the faces of `object` and add the vertices to the appropriate submeshes.
    pub fn add_object(
        &mut self,
        object_index: usize,
        object: &SceneObject,
    ) -> Result<(), CollectGeometryError> {
        let colors = if self.export_colors {
            ColorSource::new(object)
        } else {
            None
        };

        for (face_index, face) in object.faces.iter().enumerate() {
            let corner_count = face.vertices.len();
            if corner_count != 3 && corner_count != 4 {
                return Err(CollectGeometryError::InvalidFace {
                    object: object.name.clone(),
                    face: face_index,
                    corner_count,
                });
            }

            let (key, material) = self.submesh_key(object, face_index, face)?;
            let submesh = self
                .submeshes
                .entry(key)
                .or_insert_with(|| SubmeshBuilder::new(material));
            submesh.has_uvs |= !object.uv_layers.is_empty();
            submesh.has_colors |= colors.is_some();

            // Quads split along the diagonal from the first corner.
            let corners: &[usize] = if corner_count == 4 {
                &[0, 1, 2, 0, 2, 3]
            } else {
                &[0, 1, 2]
            };
            for corner in corners {
                let vertex = corner_vertex(
                    object_index,
                    object,
                    face_index,
                    face,
                    *corner,
                    colors.as_ref(),
                )?;
                submesh.add_vertex(vertex);
            }
        }

        Ok(())
    }

    /// The finished submeshes in the order they were first referenced.
    pub fn finish(self) -> (Vec<Submesh>, Vec<ExportWarning>) {
        let submeshes: Vec<_> = self.submeshes.into_values().map(|s| s.build()).collect();
        for submesh in &submeshes {
            debug!(
                "Submesh {:?}: {} vertices, {} triangles",
                submesh.material,
                submesh.vertices.len(),
                submesh.indices.len() / 3
            );
        }
        (submeshes, self.warnings)
    }

    // The grouping key and material name for the submesh containing this face.
    fn submesh_key(
        &mut self,
        object: &SceneObject,
        face_index: usize,
        face: &Face,
    ) -> Result<(String, String), CollectGeometryError> {
        match self.grouping {
            SubmeshGrouping::Material => {
                let material = if object.material_slots.is_empty() {
                    MISSING_MATERIAL.to_string()
                } else {
                    let slot = object.material_slots.get(face.material_index).ok_or_else(|| {
                        CollectGeometryError::MaterialSlotOutOfRange {
                            object: object.name.clone(),
                            face: face_index,
                            slot: face.material_index,
                            slot_count: object.material_slots.len(),
                        }
                    })?;
                    self.slot_material(object, face.material_index, slot)
                };
                Ok((material.clone(), material))
            }
            SubmeshGrouping::Object => {
                let material = match object.material_slots.first() {
                    Some(slot) => self.slot_material(object, 0, slot),
                    None => object.name.clone(),
                };
                Ok((object.name.clone(), material))
            }
        }
    }

    fn slot_material(&mut self, object: &SceneObject, slot: usize, name: &Option<String>) -> String {
        match name {
            Some(name) => name.clone(),
            None => {
                let warning = ExportWarning::MissingMaterial {
                    object: object.name.clone(),
                    slot,
                };
                if !self.warnings.contains(&warning) {
                    warn!("{warning}");
                    self.warnings.push(warning);
                }
                MISSING_MATERIAL.to_string()
            }
        }
    }
}

fn corner_vertex(
    object_index: usize,
    object: &SceneObject,
    face_index: usize,
    face: &Face,
    corner: usize,
    colors: Option<&ColorSource>,
) -> Result<Vertex, CollectGeometryError> {
    let vertex_index = face.vertices[corner];
    let source = object.vertices.get(vertex_index).ok_or_else(|| {
        CollectGeometryError::VertexIndexOutOfRange {
            object: object.name.clone(),
            face: face_index,
            vertex: vertex_index,
            vertex_count: object.vertices.len(),
        }
    })?;

    let missing_corner = |layer: &str| CollectGeometryError::MissingCornerData {
        object: object.name.clone(),
        layer: layer.to_string(),
        face: face_index,
        corner,
    };

    // Only the first UV layer is exported.
    let uv = match object.uv_layers.first() {
        Some(layer) => *layer
            .uvs
            .get(face_index)
            .and_then(|uvs| uvs.get(corner))
            .ok_or_else(|| missing_corner(&layer.name))?,
        None => Vec2::ZERO,
    };

    let mut color = Vec4::ONE;
    if let Some(colors) = colors {
        if let Some(layer) = colors.rgb {
            let rgb = layer_color(layer, face_index, corner).ok_or_else(|| missing_corner(&layer.name))?;
            color = rgb.extend(1.0);
        }
        if let Some(layer) = colors.alpha {
            let rgb = layer_color(layer, face_index, corner).ok_or_else(|| missing_corner(&layer.name))?;
            color.w = luminosity(rgb);
        }
    }

    let normal = if face.smooth {
        source.normal
    } else {
        face.normal
    };

    if !(source.position.is_finite() && normal.is_finite() && uv.is_finite() && color.is_finite())
    {
        return Err(CollectGeometryError::NonFinite {
            object: object.name.clone(),
            vertex: vertex_index,
        });
    }

    let bone_weights = source
        .groups
        .iter()
        .filter(|g| g.weight > MIN_BONE_WEIGHT)
        .map(|g| {
            let name = object.vertex_groups.get(g.group).ok_or_else(|| {
                CollectGeometryError::VertexGroupOutOfRange {
                    object: object.name.clone(),
                    vertex: vertex_index,
                    group: g.group,
                    group_count: object.vertex_groups.len(),
                }
            })?;
            Ok((name.clone(), g.weight))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Vertex {
        position: source.position,
        normal,
        uv,
        color,
        bone_weights,
        source: SourceVertexIndex {
            object_index,
            vertex_index,
        },
    })
}

fn layer_color(layer: &ColorLayer, face: usize, corner: usize) -> Option<Vec3> {
    layer.colors.get(face)?.get(corner).copied()
}

// Brightness of a color used for the alpha channel.
fn luminosity(c: Vec3) -> f32 {
    c.x * 0.25 + c.y * 0.5 + c.z * 0.25
}

/// Collect the faces of all `objects` into submeshes.
#[tracing::instrument(skip_all)]
pub fn collect_submeshes(
    objects: &[SceneObject],
    grouping: SubmeshGrouping,
    export_colors: bool,
) -> Result<(Vec<Submesh>, Vec<ExportWarning>), CollectGeometryError> {
    let mut collector = GeometryCollector::new(grouping, export_colors);
    for (i, object) in objects.iter().enumerate() {
        collector.add_object(i, object)?;
    }
    Ok(collector.finish())
}
