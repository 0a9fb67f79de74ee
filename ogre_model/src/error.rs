use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no exportable geometry found in the scene")]
    InputMissing,

    #[error("error creating skeleton")]
    Skeleton(#[from] CreateSkeletonError),

    #[error("error collecting mesh geometry")]
    Geometry(#[from] CollectGeometryError),

    #[error("error calculating tangents")]
    Tangents(#[from] TangentError),

    #[error("error encoding shape key poses")]
    Poses(#[from] EncodePosesError),

    #[error("error sampling animations")]
    Animation(#[from] SampleAnimationError),

    #[error("error writing {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum CreateSkeletonError {
    #[error("bone {name:?} appears more than once in armature {armature:?}")]
    DuplicateBoneName { armature: String, name: String },

    #[error("parent {parent:?} of bone {bone:?} does not exist")]
    MissingParent { bone: String, parent: String },

    #[error("bone {bone:?} is its own ancestor")]
    CyclicParent { bone: String },

    #[error("persisted id {id} for bone {bone:?} is out of range for {bone_count} bones")]
    BoneIdOutOfRange {
        bone: String,
        id: usize,
        bone_count: usize,
    },

    #[error("persisted id {id} is assigned to both {first:?} and {second:?}")]
    DuplicateBoneId {
        id: usize,
        first: String,
        second: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum CollectGeometryError {
    #[error("face {face} of object {object:?} has {corner_count} corners but only triangles and quads are supported")]
    InvalidFace {
        object: String,
        face: usize,
        corner_count: usize,
    },

    #[error("face {face} of object {object:?} references vertex {vertex} out of range for {vertex_count} vertices")]
    VertexIndexOutOfRange {
        object: String,
        face: usize,
        vertex: usize,
        vertex_count: usize,
    },

    #[error("face {face} of object {object:?} uses material slot {slot} out of range for {slot_count} slots")]
    MaterialSlotOutOfRange {
        object: String,
        face: usize,
        slot: usize,
        slot_count: usize,
    },

    #[error("vertex {vertex} of object {object:?} uses vertex group {group} out of range for {group_count} groups")]
    VertexGroupOutOfRange {
        object: String,
        vertex: usize,
        group: usize,
        group_count: usize,
    },

    #[error("layer {layer:?} of object {object:?} has no value for corner {corner} of face {face}")]
    MissingCornerData {
        object: String,
        layer: String,
        face: usize,
        corner: usize,
    },

    #[error("vertex {vertex} of object {object:?} contains a non finite value")]
    NonFinite { object: String, vertex: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum TangentError {
    #[error("triangle {triangle} references vertex {vertex} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        vertex: usize,
        vertex_count: usize,
    },

    #[error("triangle {triangle} produced a non finite tangent basis")]
    NonFinite { triangle: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum EncodePosesError {
    #[error("shape key {key:?} of object {object:?} references missing relative key {relative_key:?}")]
    MissingRelativeKey {
        object: String,
        key: String,
        relative_key: String,
    },

    #[error("shape key {key:?} of object {object:?} has no position for vertex {vertex}")]
    MissingPosition {
        object: String,
        key: String,
        vertex: usize,
    },

    #[error("shape key {key:?} of object {object:?} has a non finite position for vertex {vertex}")]
    NonFinite {
        object: String,
        key: String,
        vertex: usize,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum SampleAnimationError {
    #[error("action {name:?} does not exist")]
    MissingAction { name: String },

    #[error("no action is active")]
    NoActiveAction,

    #[error("pose bone {name:?} has no matching bone in the armature")]
    MissingBone { name: String },

    #[error("action {name:?} ends at frame {end} before its start frame {start}")]
    InvalidFrameRange { name: String, start: i32, end: i32 },

    #[error("frame step must be at least 1")]
    InvalidFrameStep,

    #[error("frames per second must be positive but found {fps}")]
    InvalidFrameRate { fps: f32 },
}

/// Recoverable problems reported alongside a successful export.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ExportWarning {
    #[error("cannot export tangents for submesh {material:?} with no UV map")]
    MissingUvForTangents { material: String },

    #[error("object {object:?} has an empty material slot {slot}")]
    MissingMaterial { object: String, slot: usize },

    #[error("material {name:?} is referenced but never defined")]
    UndefinedMaterial { name: String },

    #[error("vertex group {name:?} does not match any bone in the skeleton")]
    UnknownBoneInfluence { name: String },

    #[error("failed to convert {path:?} with the external mesh compiler: {reason}")]
    ExternalCompilerFailure { path: PathBuf, reason: String },

    #[error("failed to copy texture {path:?}: {reason}")]
    AssetCopyFailure { path: PathBuf, reason: String },
}
