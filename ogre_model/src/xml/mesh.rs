use xmltree::Element;

use super::{element, format_coord, format_fixed, push, vector_element};
use crate::{
    geometry::Submesh, model::MeshModel, pose::Pose, skeleton::Skeleton, transform::to_ogre_axes,
};

/// The `<mesh>` document for `model`.
///
/// Geometry is converted from Z-up to OGRE's Y-up coordinates.
/// `skeleton_link` is the `.skeleton` file name referenced by the mesh.
#[tracing::instrument(skip_all)]
pub fn mesh_xml(model: &MeshModel, skeleton_link: Option<&str>) -> Element {
    let mut mesh = Element::new("mesh");

    let mut submeshes = Element::new("submeshes");
    for submesh in &model.submeshes {
        push(
            &mut submeshes,
            submesh_element(submesh, model.skeleton.as_ref()),
        );
    }
    push(&mut mesh, submeshes);

    if !model.poses.is_empty() {
        push(&mut mesh, poses_element(&model.poses));
    }

    if let Some(name) = skeleton_link {
        push(&mut mesh, element("skeletonlink", [("name", name.to_string())]));
    }

    mesh
}

fn submesh_element(submesh: &Submesh, skeleton: Option<&Skeleton>) -> Element {
    let mut element = element(
        "submesh",
        [
            ("material", submesh.material.clone()),
            ("usesharedvertices", "false".to_string()),
            ("use32bitindexes", submesh.use_32bit_indices().to_string()),
            ("operationtype", "triangle_list".to_string()),
        ],
    );

    push(&mut element, faces_element(&submesh.indices));
    push(&mut element, geometry_element(submesh));
    if let Some(skeleton) = skeleton {
        push(&mut element, bone_assignments_element(submesh, skeleton));
    }

    element
}

fn faces_element(indices: &[u32]) -> Element {
    let triangles = indices.chunks_exact(3);
    let mut faces = element("faces", [("count", triangles.len().to_string())]);
    for face in triangles {
        push(
            &mut faces,
            element(
                "face",
                [
                    ("v1", face[0].to_string()),
                    ("v2", face[1].to_string()),
                    ("v3", face[2].to_string()),
                ],
            ),
        );
    }
    faces
}

fn geometry_element(submesh: &Submesh) -> Element {
    let mut geometry = element(
        "geometry",
        [("vertexcount", submesh.vertices.len().to_string())],
    );

    let mut buffer = element(
        "vertexbuffer",
        [
            ("positions", "true".to_string()),
            ("normals", "true".to_string()),
        ],
    );
    let mut set_flag = |name: &str, value: &str| {
        buffer
            .attributes
            .insert(name.to_string(), value.to_string());
    };
    if submesh.has_uvs {
        set_flag("texture_coord_dimensions_0", "2");
        set_flag("texture_coords", "1");
    }
    if submesh.has_colors {
        set_flag("colours_diffuse", "true");
    }
    if submesh.tangents.is_some() {
        set_flag("tangents", "true");
    }
    if submesh.binormals.is_some() {
        set_flag("binormals", "true");
    }

    for (i, v) in submesh.vertices.iter().enumerate() {
        let mut vertex = Element::new("vertex");
        push(&mut vertex, vector_element("position", to_ogre_axes(v.position)));
        push(&mut vertex, vector_element("normal", to_ogre_axes(v.normal)));
        if submesh.has_uvs {
            // OGRE texture coordinates start from the top of the image.
            push(
                &mut vertex,
                element(
                    "texcoord",
                    [
                        ("u", format_coord(v.uv.x)),
                        ("v", format_coord(1.0 - v.uv.y)),
                    ],
                ),
            );
        }
        if submesh.has_colors {
            let value = v
                .color
                .to_array()
                .map(format_coord)
                .join(" ");
            push(&mut vertex, element("colour_diffuse", [("value", value)]));
        }
        if let Some(tangent) = submesh.tangents.as_ref().and_then(|t| t.get(i)) {
            push(&mut vertex, vector_element("tangent", to_ogre_axes(*tangent)));
        }
        if let Some(binormal) = submesh.binormals.as_ref().and_then(|b| b.get(i)) {
            push(&mut vertex, vector_element("binormal", to_ogre_axes(*binormal)));
        }
        push(&mut buffer, vertex);
    }

    push(&mut geometry, buffer);
    geometry
}

fn bone_assignments_element(submesh: &Submesh, skeleton: &Skeleton) -> Element {
    let mut assignments = Element::new("boneassignments");
    for (i, vertex) in submesh.vertices.iter().enumerate() {
        for (name, weight) in &vertex.bone_weights {
            if let Some(id) = skeleton.bone_id(name) {
                push(
                    &mut assignments,
                    element(
                        "vertexboneassignment",
                        [
                            ("vertexindex", i.to_string()),
                            ("boneindex", id.to_string()),
                            ("weight", format_fixed(*weight)),
                        ],
                    ),
                );
            }
        }
    }
    assignments
}

fn poses_element(poses: &[Pose]) -> Element {
    let mut element_poses = Element::new("poses");
    for pose in poses {
        let mut element_pose = element(
            "pose",
            [
                ("target", "submesh".to_string()),
                ("index", pose.submesh_index.to_string()),
                ("name", pose.name.clone()),
            ],
        );
        for offset in &pose.offsets {
            let v = to_ogre_axes(offset.offset);
            push(
                &mut element_pose,
                element(
                    "poseoffset",
                    [
                        ("index", offset.index.to_string()),
                        ("x", format_fixed(v.x)),
                        ("y", format_fixed(v.y)),
                        ("z", format_fixed(v.z)),
                    ],
                ),
            );
        }
        push(&mut element_poses, element_pose);
    }
    element_poses
}
