//! Resolved scene data handed over by the host application.
//!
//! The host is responsible for selection, applying object transforms and modifiers,
//! and tessellating faces into triangles and quads before export.
//! Positions, normals, and matrices use the host's Z-up convention.
use std::path::PathBuf;

use glam::{Mat4, Vec2, Vec3};

use crate::{
    animation::{AnimationHost, PoseBone},
    error::SampleAnimationError,
    transform::Transform,
};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone)]
pub struct Scene {
    /// The selected mesh objects in selection order.
    pub objects: Vec<SceneObject>,
    pub materials: Vec<SourceMaterial>,
    /// The armature deforming the first selected object.
    pub armature: Option<Armature>,
    pub frames_per_second: f32,
    /// The frame increment used when sampling animations.
    pub frame_step: u32,
    /// The frame displayed by the host before exporting.
    pub current_frame: i32,
    /// The folder for resolving `//` relative texture paths.
    pub base_dir: Option<PathBuf>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            materials: Vec::new(),
            armature: None,
            frames_per_second: 24.0,
            frame_step: 1,
            current_frame: 1,
            base_dir: None,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct SceneObject {
    pub name: String,
    pub vertices: Vec<SourceVertex>,
    pub faces: Vec<Face>,
    /// Material names for each slot or `None` for an empty slot.
    pub material_slots: Vec<Option<String>>,
    /// UV layers in order. Only the first layer is exported.
    pub uv_layers: Vec<UvLayer>,
    pub color_layers: Vec<ColorLayer>,
    /// The index of the active layer in [color_layers](#structfield.color_layers).
    pub active_color_layer: Option<usize>,
    /// Vertex group names referenced by [VertexGroupWeight::group].
    pub vertex_groups: Vec<String>,
    pub shape_keys: Vec<ShapeKey>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct SourceVertex {
    pub position: Vec3,
    /// The smooth shading normal.
    pub normal: Vec3,
    pub groups: Vec<VertexGroupWeight>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct VertexGroupWeight {
    pub group: usize,
    pub weight: f32,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone)]
pub struct Face {
    /// Indices into [vertices](struct.SceneObject.html#structfield.vertices) for each corner.
    pub vertices: Vec<usize>,
    /// Use vertex normals if `true` and the face normal otherwise.
    pub smooth: bool,
    pub normal: Vec3,
    pub material_index: usize,
}

impl Default for Face {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            smooth: true,
            normal: Vec3::Z,
            material_index: 0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct UvLayer {
    pub name: String,
    /// The UV for each corner of each face.
    pub uvs: Vec<Vec<Vec2>>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ColorLayer {
    pub name: String,
    /// The RGB color for each corner of each face.
    pub colors: Vec<Vec<Vec3>>,
}

impl ColorLayer {
    /// Layers with this name provide vertex alpha instead of color.
    pub fn is_alpha(&self) -> bool {
        self.name == "Alpha" || self.name == "alpha"
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ShapeKey {
    pub name: String,
    /// The key these positions are relative to.
    /// Keys without a relative key are not exported.
    pub relative_key: Option<String>,
    /// The position of each vertex for this key.
    pub positions: Vec<Vec3>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone)]
pub struct SourceMaterial {
    pub name: String,
    pub ambient: f32,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub emit: f32,
    /// Image texture slots in order.
    pub textures: Vec<TextureSlot>,
}

impl Default for SourceMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            ambient: 1.0,
            diffuse: Vec3::splat(0.8),
            specular: Vec3::ONE,
            emit: 0.0,
            textures: Vec::new(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct TextureSlot {
    /// The image name written to the material script.
    pub image: String,
    /// The image file path as stored by the host.
    pub path: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Armature {
    /// Identifies the rig across repeated exports.
    pub name: String,
    pub bones: Vec<ArmatureBone>,
    pub animation: Option<AnimationData>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone)]
pub struct ArmatureBone {
    pub name: String,
    pub parent: Option<String>,
    /// The rest matrix of the bone in armature space.
    pub rest_matrix: Mat4,
    /// The bone index saved on the bone by a previous export.
    pub persisted_id: Option<usize>,
}

impl Default for ArmatureBone {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: None,
            rest_matrix: Mat4::IDENTITY,
            persisted_id: None,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct AnimationData {
    pub active_action: Option<String>,
    /// Actions referenced by non linear animation strips in track order.
    pub strip_actions: Vec<String>,
    pub actions: Vec<Action>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Action {
    pub name: String,
    pub frame_start: i32,
    pub frame_end: i32,
    pub channels: Vec<BoneChannel>,
}

/// Baked pose keys for a single bone.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct BoneChannel {
    pub bone: String,
    /// Keys sorted by frame.
    pub keys: Vec<PoseKey>,
}

/// The local pose of a bone relative to its rest pose.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PoseKey {
    pub frame: i32,
    pub transform: Transform,
}

impl SceneObject {
    pub fn shape_key(&self, name: &str) -> Option<&ShapeKey> {
        self.shape_keys.iter().find(|k| k.name == name)
    }
}

impl BoneChannel {
    /// Evaluate the pose at `frame` by interpolating between the surrounding keys.
    /// Frames outside the keyed range hold the first or last key.
    pub fn evaluate(&self, frame: i32) -> Transform {
        let next = self.keys.partition_point(|k| k.frame <= frame);
        match (next.checked_sub(1).map(|i| &self.keys[i]), self.keys.get(next)) {
            (Some(previous), Some(next)) => {
                let t = (frame - previous.frame) as f32 / (next.frame - previous.frame) as f32;
                previous.transform.lerp(next.transform, t)
            }
            (Some(previous), None) => previous.transform,
            (None, Some(next)) => next.transform,
            (None, None) => Transform::IDENTITY,
        }
    }
}

impl Action {
    pub fn evaluate(&self, bone: &str, frame: i32) -> Transform {
        self.channels
            .iter()
            .find(|c| c.bone == bone)
            .map(|c| c.evaluate(frame))
            .unwrap_or(Transform::IDENTITY)
    }
}

/// An [AnimationHost] that evaluates the baked actions of an [Armature].
///
/// The frame and action cursor start at the values recorded in the [Scene].
#[derive(Debug)]
pub struct ScenePlayer<'a> {
    armature: &'a Armature,
    data: &'a AnimationData,
    current_frame: i32,
    active_action: Option<String>,
}

impl<'a> ScenePlayer<'a> {
    /// Returns `None` if the armature has no animation data.
    pub fn new(armature: &'a Armature, current_frame: i32) -> Option<Self> {
        let data = armature.animation.as_ref()?;
        Some(Self {
            armature,
            data,
            current_frame,
            active_action: data.active_action.clone(),
        })
    }

    fn action(&self, name: &str) -> Result<&'a Action, SampleAnimationError> {
        self.data
            .actions
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| SampleAnimationError::MissingAction {
                name: name.to_string(),
            })
    }
}

impl AnimationHost for ScenePlayer<'_> {
    fn current_frame(&self) -> i32 {
        self.current_frame
    }

    fn set_current_frame(&mut self, frame: i32) {
        self.current_frame = frame;
    }

    fn active_action(&self) -> Option<String> {
        self.active_action.clone()
    }

    fn set_active_action(&mut self, action: Option<String>) {
        self.active_action = action;
    }

    fn strip_actions(&self) -> Vec<String> {
        self.data.strip_actions.clone()
    }

    fn frame_range(&self, action: &str) -> Result<(i32, i32), SampleAnimationError> {
        let action = self.action(action)?;
        Ok((action.frame_start, action.frame_end))
    }

    fn pose_bones(&self) -> Result<Vec<PoseBone>, SampleAnimationError> {
        let name = self
            .active_action
            .as_deref()
            .ok_or(SampleAnimationError::NoActiveAction)?;
        let action = self.action(name)?;

        Ok(self
            .armature
            .bones
            .iter()
            .map(|bone| PoseBone {
                name: bone.name.clone(),
                transform: action.evaluate(&bone.name, self.current_frame),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::vec3;

    fn key(frame: i32, x: f32) -> PoseKey {
        PoseKey {
            frame,
            transform: Transform {
                translation: vec3(x, 0.0, 0.0),
                ..Transform::IDENTITY
            },
        }
    }

    #[test]
    fn evaluate_channel_no_keys() {
        let channel = BoneChannel {
            bone: "a".to_string(),
            keys: Vec::new(),
        };
        assert_eq!(Transform::IDENTITY, channel.evaluate(5));
    }

    #[test]
    fn evaluate_channel_holds_ends() {
        let channel = BoneChannel {
            bone: "a".to_string(),
            keys: vec![key(2, 1.0), key(6, 5.0)],
        };
        assert_eq!(vec3(1.0, 0.0, 0.0), channel.evaluate(0).translation);
        assert_eq!(vec3(1.0, 0.0, 0.0), channel.evaluate(2).translation);
        assert_eq!(vec3(5.0, 0.0, 0.0), channel.evaluate(6).translation);
        assert_eq!(vec3(5.0, 0.0, 0.0), channel.evaluate(10).translation);
    }

    #[test]
    fn evaluate_channel_interpolates() {
        let channel = BoneChannel {
            bone: "a".to_string(),
            keys: vec![key(2, 1.0), key(6, 5.0)],
        };
        assert_eq!(vec3(2.0, 0.0, 0.0), channel.evaluate(3).translation);
        assert_eq!(vec3(3.0, 0.0, 0.0), channel.evaluate(4).translation);
    }

    #[test]
    fn evaluate_action_unanimated_bone() {
        let action = Action {
            name: "walk".to_string(),
            frame_start: 1,
            frame_end: 10,
            channels: vec![BoneChannel {
                bone: "a".to_string(),
                keys: vec![key(1, 1.0)],
            }],
        };
        assert_eq!(Transform::IDENTITY, action.evaluate("b", 3));
    }

    #[test]
    fn player_without_animation_data() {
        let armature = Armature::default();
        assert!(ScenePlayer::new(&armature, 1).is_none());
    }

    #[test]
    fn player_pose_bones_active_action() {
        let armature = Armature {
            name: "rig".to_string(),
            bones: vec![
                ArmatureBone {
                    name: "a".to_string(),
                    ..Default::default()
                },
                ArmatureBone {
                    name: "b".to_string(),
                    parent: Some("a".to_string()),
                    ..Default::default()
                },
            ],
            animation: Some(AnimationData {
                active_action: Some("walk".to_string()),
                strip_actions: Vec::new(),
                actions: vec![Action {
                    name: "walk".to_string(),
                    frame_start: 1,
                    frame_end: 3,
                    channels: vec![BoneChannel {
                        bone: "b".to_string(),
                        keys: vec![key(1, 0.0), key(3, 2.0)],
                    }],
                }],
            }),
        };

        let mut player = ScenePlayer::new(&armature, 1).unwrap();
        player.set_current_frame(2);
        assert_eq!(
            vec![
                PoseBone {
                    name: "a".to_string(),
                    transform: Transform::IDENTITY
                },
                PoseBone {
                    name: "b".to_string(),
                    transform: Transform {
                        translation: vec3(1.0, 0.0, 0.0),
                        ..Transform::IDENTITY
                    }
                }
            ],
            player.pose_bones().unwrap()
        );
        assert_eq!(Ok((1, 3)), player.frame_range("walk"));
        assert_eq!(
            Err(SampleAnimationError::MissingAction {
                name: "run".to_string()
            }),
            player.frame_range("run")
        );
    }

    #[test]
    fn player_pose_bones_no_active_action() {
        let armature = Armature {
            name: "rig".to_string(),
            bones: Vec::new(),
            animation: Some(AnimationData::default()),
        };
        let player = ScenePlayer::new(&armature, 1).unwrap();
        assert_eq!(
            Err(SampleAnimationError::NoActiveAction),
            player.pose_bones()
        );
    }
}
