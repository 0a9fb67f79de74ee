//! The complete set of data written for a single export.
use indexmap::IndexMap;
use log::{info, warn};

use crate::{
    ExportSettings,
    animation::{Animation, AnimationHost, sample_animations},
    error::{ExportError, ExportWarning, SampleAnimationError},
    geometry::{Submesh, collect_submeshes},
    material::{Material, collect_materials},
    pose::{Pose, encode_poses},
    scene::{Armature, Scene, ScenePlayer},
    skeleton::{BoneIdRegistry, Skeleton},
    tangent::{calculate_binormals, calculate_tangents},
};

#[derive(Debug, PartialEq, Clone)]
pub struct MeshModel {
    pub submeshes: Vec<Submesh>,
    /// Materials referenced by the submeshes in the order they were first used.
    pub materials: IndexMap<String, Material>,
    pub skeleton: Option<Skeleton>,
    pub animations: Vec<Animation>,
    /// Poses for all submeshes ordered by submesh index.
    pub poses: Vec<Pose>,
}

impl MeshModel {
    /// Convert `scene` using the baked actions stored on the armature.
    pub fn from_scene(
        scene: &Scene,
        settings: &ExportSettings,
        registry: &mut BoneIdRegistry,
    ) -> Result<(Self, Vec<ExportWarning>), ExportError> {
        Self::from_scene_with(scene, settings, registry, |armature| {
            match ScenePlayer::new(armature, scene.current_frame) {
                Some(mut player) => sample_animations(
                    &mut player,
                    armature,
                    scene.frames_per_second,
                    scene.frame_step,
                ),
                None => Ok(Vec::new()),
            }
        })
    }

    /// Convert `scene` with animations evaluated by `host`.
    pub fn from_scene_with_host<H: AnimationHost>(
        scene: &Scene,
        settings: &ExportSettings,
        registry: &mut BoneIdRegistry,
        host: &mut H,
    ) -> Result<(Self, Vec<ExportWarning>), ExportError> {
        Self::from_scene_with(scene, settings, registry, |armature| {
            sample_animations(host, armature, scene.frames_per_second, scene.frame_step)
        })
    }

    #[tracing::instrument(skip_all)]
    fn from_scene_with<F>(
        scene: &Scene,
        settings: &ExportSettings,
        registry: &mut BoneIdRegistry,
        sample: F,
    ) -> Result<(Self, Vec<ExportWarning>), ExportError>
    where
        F: FnOnce(&Armature) -> Result<Vec<Animation>, SampleAnimationError>,
    {
        if scene.objects.iter().all(|o| o.faces.is_empty()) {
            return Err(ExportError::InputMissing);
        }

        let skeleton = scene
            .armature
            .as_ref()
            .map(|a| Skeleton::from_armature(a, registry))
            .transpose()?;

        let (mut submeshes, mut warnings) = collect_submeshes(
            &scene.objects,
            settings.submesh_grouping,
            settings.export_colour,
        )?;
        info!("Collected {} submeshes", submeshes.len());

        if let Some(skeleton) = &skeleton {
            remove_unknown_influences(&mut submeshes, skeleton, &mut warnings);
        }

        if settings.export_tangents {
            for submesh in &mut submeshes {
                add_tangents(submesh, settings.export_binormals, &mut warnings)?;
            }
        }

        let mut poses = Vec::new();
        if settings.export_poses {
            for (i, submesh) in submeshes.iter().enumerate() {
                poses.extend(encode_poses(i, submesh, &scene.objects)?);
            }
        }

        let mut animations = Vec::new();
        if settings.export_animation {
            if let (Some(armature), Some(_)) = (&scene.armature, &skeleton) {
                animations = sample(armature)?;
            }
        }

        let (materials, material_warnings) = collect_materials(&scene.objects, &scene.materials);
        warnings.extend(material_warnings);

        Ok((
            Self {
                submeshes,
                materials,
                skeleton,
                animations,
                poses,
            },
            warnings,
        ))
    }
}

// Vertex groups that aren't bones can't be written as bone assignments.
fn remove_unknown_influences(
    submeshes: &mut [Submesh],
    skeleton: &Skeleton,
    warnings: &mut Vec<ExportWarning>,
) {
    for vertex in submeshes.iter_mut().flat_map(|s| s.vertices.iter_mut()) {
        vertex.bone_weights.retain(|(name, _)| {
            let known = skeleton.bone_id(name).is_some();
            if !known {
                let warning = ExportWarning::UnknownBoneInfluence { name: name.clone() };
                if !warnings.contains(&warning) {
                    warn!("{warning}");
                    warnings.push(warning);
                }
            }
            known
        });
    }
}

fn add_tangents(
    submesh: &mut Submesh,
    export_binormals: bool,
    warnings: &mut Vec<ExportWarning>,
) -> Result<(), ExportError> {
    if !submesh.has_uvs {
        let warning = ExportWarning::MissingUvForTangents {
            material: submesh.material.clone(),
        };
        warn!("{warning}");
        warnings.push(warning);
        return Ok(());
    }

    let normals = submesh.normals();
    let tangents = calculate_tangents(
        &submesh.indices,
        &submesh.positions(),
        &normals,
        &submesh.uvs(),
    )?;
    if export_binormals {
        submesh.binormals = Some(calculate_binormals(&normals, &tangents));
    }
    submesh.tangents = Some(tangents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::{Mat4, Vec3, vec2, vec3};

    use crate::{
        SubmeshGrouping,
        scene::{
            Action, AnimationData, ArmatureBone, BoneChannel, Face, PoseKey, SceneObject,
            ShapeKey, SourceMaterial, SourceVertex, UvLayer, VertexGroupWeight,
        },
        transform::Transform,
    };

    fn quad(name: &str) -> SceneObject {
        let vertex = |x, y| SourceVertex {
            position: vec3(x, y, 0.0),
            normal: Vec3::Z,
            groups: vec![VertexGroupWeight {
                group: 0,
                weight: 1.0,
            }],
        };
        SceneObject {
            name: name.to_string(),
            vertices: vec![
                vertex(0.0, 0.0),
                vertex(1.0, 0.0),
                vertex(1.0, 1.0),
                vertex(0.0, 1.0),
            ],
            faces: vec![Face {
                vertices: vec![0, 1, 2, 3],
                ..Default::default()
            }],
            material_slots: vec![Some("mat".to_string())],
            uv_layers: vec![UvLayer {
                name: "UVMap".to_string(),
                uvs: vec![vec![
                    vec2(0.0, 0.0),
                    vec2(1.0, 0.0),
                    vec2(1.0, 1.0),
                    vec2(0.0, 1.0),
                ]],
            }],
            vertex_groups: vec!["root".to_string()],
            shape_keys: vec![
                ShapeKey {
                    name: "Basis".to_string(),
                    relative_key: None,
                    positions: vec![Vec3::ZERO; 4],
                },
                ShapeKey {
                    name: "lift".to_string(),
                    relative_key: Some("Basis".to_string()),
                    positions: vec![Vec3::ZERO, Vec3::ZERO, Vec3::Z, Vec3::ZERO],
                },
            ],
            ..Default::default()
        }
    }

    fn armature(bone: &str) -> Armature {
        Armature {
            name: "rig".to_string(),
            bones: vec![ArmatureBone {
                name: bone.to_string(),
                rest_matrix: Mat4::IDENTITY,
                ..Default::default()
            }],
            animation: Some(AnimationData {
                active_action: Some("bob".to_string()),
                strip_actions: Vec::new(),
                actions: vec![Action {
                    name: "bob".to_string(),
                    frame_start: 1,
                    frame_end: 3,
                    channels: vec![BoneChannel {
                        bone: bone.to_string(),
                        keys: vec![
                            PoseKey {
                                frame: 1,
                                transform: Transform::IDENTITY,
                            },
                            PoseKey {
                                frame: 3,
                                transform: Transform {
                                    translation: vec3(0.0, 0.0, 1.0),
                                    ..Transform::IDENTITY
                                },
                            },
                        ],
                    }],
                }],
            }),
        }
    }

    fn scene(objects: Vec<SceneObject>, armature: Option<Armature>) -> Scene {
        Scene {
            objects,
            materials: vec![SourceMaterial {
                name: "mat".to_string(),
                ..Default::default()
            }],
            armature,
            ..Default::default()
        }
    }

    #[test]
    fn from_scene_no_objects() {
        let result = MeshModel::from_scene(
            &Scene::default(),
            &ExportSettings::default(),
            &mut BoneIdRegistry::default(),
        );
        assert!(matches!(result, Err(ExportError::InputMissing)));
    }

    #[test]
    fn from_scene_objects_without_faces() {
        let object = SceneObject {
            faces: Vec::new(),
            ..quad("a")
        };
        let result = MeshModel::from_scene(
            &scene(vec![object], None),
            &ExportSettings::default(),
            &mut BoneIdRegistry::default(),
        );
        assert!(matches!(result, Err(ExportError::InputMissing)));
    }

    #[test]
    fn from_scene_defaults() {
        let (model, warnings) = MeshModel::from_scene(
            &scene(vec![quad("a")], None),
            &ExportSettings::default(),
            &mut BoneIdRegistry::default(),
        )
        .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(1, model.submeshes.len());
        assert_eq!(None, model.submeshes[0].tangents);
        assert!(model.poses.is_empty());
        assert!(model.animations.is_empty());
        assert_eq!(None, model.skeleton);
        assert_eq!(vec!["mat"], model.materials.keys().collect::<Vec<_>>());
    }

    #[test]
    fn from_scene_all_features() {
        let settings = ExportSettings {
            export_tangents: true,
            export_binormals: true,
            export_poses: true,
            export_animation: true,
            ..Default::default()
        };
        let (model, warnings) = MeshModel::from_scene(
            &scene(vec![quad("a")], Some(armature("root"))),
            &settings,
            &mut BoneIdRegistry::default(),
        )
        .unwrap();
        assert!(warnings.is_empty());

        let submesh = &model.submeshes[0];
        assert_eq!(Some(4), submesh.tangents.as_ref().map(|t| t.len()));
        assert_eq!(Some(4), submesh.binormals.as_ref().map(|t| t.len()));
        assert_eq!(vec![("root".to_string(), 1.0)], submesh.vertices[0].bone_weights);

        assert_eq!(1, model.poses.len());
        assert_eq!("lift", model.poses[0].name);
        assert_eq!(1, model.poses[0].offsets.len());
        assert_eq!(2, model.poses[0].offsets[0].index);

        assert_eq!(1, model.animations.len());
        assert_eq!(1, model.animations[0].tracks.len());
        assert_eq!(3, model.animations[0].tracks[0].keyframes.len());
    }

    #[test]
    fn from_scene_tangents_without_uvs() {
        let object = SceneObject {
            uv_layers: Vec::new(),
            ..quad("a")
        };
        let settings = ExportSettings {
            export_tangents: true,
            ..Default::default()
        };
        let (model, warnings) = MeshModel::from_scene(
            &scene(vec![object], None),
            &settings,
            &mut BoneIdRegistry::default(),
        )
        .unwrap();
        assert_eq!(None, model.submeshes[0].tangents);
        assert_eq!(
            vec![ExportWarning::MissingUvForTangents {
                material: "mat".to_string()
            }],
            warnings
        );
    }

    #[test]
    fn from_scene_unknown_bone_influence() {
        let (model, warnings) = MeshModel::from_scene(
            &scene(vec![quad("a")], Some(armature("spine"))),
            &ExportSettings::default(),
            &mut BoneIdRegistry::default(),
        )
        .unwrap();
        assert!(model.submeshes[0].vertices[0].bone_weights.is_empty());
        assert_eq!(
            vec![ExportWarning::UnknownBoneInfluence {
                name: "root".to_string()
            }],
            warnings
        );
    }

    #[test]
    fn from_scene_cyclic_armature() {
        let mut armature = armature("a");
        armature.bones[0].parent = Some("a".to_string());
        let result = MeshModel::from_scene(
            &scene(vec![quad("a")], Some(armature)),
            &ExportSettings::default(),
            &mut BoneIdRegistry::default(),
        );
        assert!(matches!(result, Err(ExportError::Skeleton(_))));
    }

    #[test]
    fn from_scene_group_by_object() {
        let settings = ExportSettings {
            submesh_grouping: SubmeshGrouping::Object,
            ..Default::default()
        };
        let (model, _) = MeshModel::from_scene(
            &scene(vec![quad("a"), quad("b")], None),
            &settings,
            &mut BoneIdRegistry::default(),
        )
        .unwrap();
        assert_eq!(2, model.submeshes.len());
    }

    #[test]
    fn from_scene_coincident_objects_keep_own_data() {
        // Both objects share positions and a material but not groups or shape keys.
        let a = SceneObject {
            shape_keys: Vec::new(),
            ..quad("a")
        };
        let mut b = quad("b");
        b.vertex_groups = vec!["hand".to_string()];
        b.shape_keys[1].name = "b_smile".to_string();
        b.shape_keys[1].positions = vec![Vec3::Z, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO];

        let settings = ExportSettings {
            export_poses: true,
            ..Default::default()
        };
        let (model, _) = MeshModel::from_scene(
            &scene(vec![a, b], None),
            &settings,
            &mut BoneIdRegistry::default(),
        )
        .unwrap();

        assert_eq!(1, model.submeshes.len());
        let submesh = &model.submeshes[0];
        assert_eq!(8, submesh.vertices.len());
        assert_eq!(vec![("root".to_string(), 1.0)], submesh.vertices[0].bone_weights);
        assert_eq!(vec![("hand".to_string(), 1.0)], submesh.vertices[4].bone_weights);

        assert_eq!(1, model.poses.len());
        assert_eq!("b_smile", model.poses[0].name);
        assert_eq!(
            vec![4],
            model.poses[0].offsets.iter().map(|o| o.index).collect::<Vec<_>>()
        );
    }
}
