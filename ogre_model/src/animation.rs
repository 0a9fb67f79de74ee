//! Skeletal animation sampling and track pruning.
//!
//! Actions are evaluated by the host application at each sampled frame.
//! Evaluating a frame changes the host's current frame and action,
//! so sampling holds a [CursorGuard] that puts both back when finished.
use std::ops::{Deref, DerefMut};

use glam::{Mat3, Quat, Vec3};
use indexmap::IndexMap;
use log::{debug, info};

use crate::{
    error::SampleAnimationError,
    scene::Armature,
    transform::{Transform, child_translation_basis, root_translation_basis},
};

/// Components closer than this to the identity value are considered unused.
const IDENTITY_TOLERANCE: f32 = 1e-5;

/// The host application's animation evaluation state.
pub trait AnimationHost {
    fn current_frame(&self) -> i32;

    fn set_current_frame(&mut self, frame: i32);

    fn active_action(&self) -> Option<String>;

    fn set_active_action(&mut self, action: Option<String>);

    /// Actions referenced by non linear animation strips in track order.
    fn strip_actions(&self) -> Vec<String>;

    /// The inclusive start and end frame for `action`.
    fn frame_range(&self, action: &str) -> Result<(i32, i32), SampleAnimationError>;

    /// The local transform of each pose bone relative to its rest pose
    /// for the active action at the current frame.
    fn pose_bones(&self) -> Result<Vec<PoseBone>, SampleAnimationError>;
}

#[derive(Debug, PartialEq, Clone)]
pub struct PoseBone {
    pub name: String,
    pub transform: Transform,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Animation {
    pub name: String,
    /// The duration in seconds.
    pub length: f32,
    /// Tracks for bones with at least one animated component in armature bone order.
    pub tracks: Vec<Track>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Track {
    pub bone: String,
    pub keyframes: Vec<Keyframe>,
}

/// A sampled bone transform with unused components removed.
///
/// Components are either present for every keyframe in a track or for none of them.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Keyframe {
    /// The time in seconds from the start of the animation.
    pub time: f32,
    /// The translation in the parent bone's space.
    pub translation: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
}

/// Restores the host's current frame and active action when released.
///
/// Call [CursorGuard::release] once sampling succeeds.
/// Dropping the guard on an early return restores the cursor as well.
pub struct CursorGuard<'a, H: AnimationHost> {
    host: &'a mut H,
    frame: i32,
    action: Option<String>,
    released: bool,
}

impl<'a, H: AnimationHost> CursorGuard<'a, H> {
    pub fn acquire(host: &'a mut H) -> Self {
        let frame = host.current_frame();
        let action = host.active_action();
        Self {
            host,
            frame,
            action,
            released: false,
        }
    }

    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if !self.released {
            self.host.set_active_action(self.action.take());
            self.host.set_current_frame(self.frame);
            self.released = true;
        }
    }
}

impl<H: AnimationHost> Deref for CursorGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &Self::Target {
        self.host
    }
}

impl<H: AnimationHost> DerefMut for CursorGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.host
    }
}

impl<H: AnimationHost> Drop for CursorGuard<'_, H> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// The active action followed by each distinct strip action.
pub fn exportable_actions<H: AnimationHost>(host: &H) -> Vec<String> {
    let mut actions: Vec<String> = host.active_action().into_iter().collect();
    for action in host.strip_actions() {
        if !actions.contains(&action) {
            actions.push(action);
        }
    }
    actions
}

/// Sample every exportable action at every `frame_step` frames
/// and convert bone translations into the parent bone's OGRE space.
///
/// The host's current frame and action are restored before returning,
/// including when sampling fails.
#[tracing::instrument(skip_all)]
pub fn sample_animations<H: AnimationHost>(
    host: &mut H,
    armature: &Armature,
    frames_per_second: f32,
    frame_step: u32,
) -> Result<Vec<Animation>, SampleAnimationError> {
    if !(frames_per_second.is_finite() && frames_per_second > 0.0) {
        return Err(SampleAnimationError::InvalidFrameRate {
            fps: frames_per_second,
        });
    }
    if frame_step == 0 {
        return Err(SampleAnimationError::InvalidFrameStep);
    }

    let bases = translation_bases(armature)?;

    let mut guard = CursorGuard::acquire(host);
    let actions = exportable_actions(&*guard);

    let mut animations = Vec::new();
    for name in actions {
        info!("Sampling action {name:?}");
        guard.set_active_action(Some(name.clone()));

        let (start, end) = guard.frame_range(&name)?;
        if end < start {
            return Err(SampleAnimationError::InvalidFrameRange { name, start, end });
        }

        let tracks = sample_action(&mut *guard, &bases, start, end, frames_per_second, frame_step)?;
        animations.push(Animation {
            length: (end - start) as f32 / frames_per_second,
            name,
            tracks,
        });
    }

    guard.release();
    Ok(animations)
}

// The basis for each bone converting pose translations into the parent bone's space.
fn translation_bases(armature: &Armature) -> Result<IndexMap<String, Mat3>, SampleAnimationError> {
    let rest: IndexMap<_, _> = armature
        .bones
        .iter()
        .map(|b| (b.name.as_str(), Mat3::from_mat4(b.rest_matrix)))
        .collect();

    armature
        .bones
        .iter()
        .map(|bone| {
            let bone_rest = Mat3::from_mat4(bone.rest_matrix);
            let basis = match &bone.parent {
                Some(parent) => {
                    let parent_rest = rest.get(parent.as_str()).ok_or_else(|| {
                        SampleAnimationError::MissingBone {
                            name: parent.clone(),
                        }
                    })?;
                    child_translation_basis() * parent_rest.transpose() * bone_rest
                }
                None => root_translation_basis() * bone_rest,
            };
            Ok((bone.name.clone(), basis))
        })
        .collect()
}

#[derive(Default)]
struct BoneSamples {
    translations: Vec<Vec3>,
    rotations: Vec<Quat>,
    scales: Vec<Vec3>,
}

fn sample_action<H: AnimationHost>(
    host: &mut H,
    bases: &IndexMap<String, Mat3>,
    start: i32,
    end: i32,
    frames_per_second: f32,
    frame_step: u32,
) -> Result<Vec<Track>, SampleAnimationError> {
    let mut samples: IndexMap<&str, BoneSamples> = bases
        .keys()
        .map(|name| (name.as_str(), BoneSamples::default()))
        .collect();

    let mut times = Vec::new();
    for frame in (start..=end).step_by(frame_step as usize) {
        host.set_current_frame(frame);
        times.push((frame - start) as f32 / frames_per_second);

        for bone in host.pose_bones()? {
            let (basis, bone_samples) = bases
                .get(&bone.name)
                .zip(samples.get_mut(bone.name.as_str()))
                .ok_or_else(|| SampleAnimationError::MissingBone {
                    name: bone.name.clone(),
                })?;
            bone_samples
                .translations
                .push(*basis * bone.transform.translation);
            bone_samples.rotations.push(bone.transform.rotation);
            bone_samples.scales.push(bone.transform.scale);
        }
    }

    let tracks: Vec<_> = samples
        .into_iter()
        .filter_map(|(bone, s)| track(bone, &times, s))
        .collect();
    debug!("Kept {} of {} bone tracks", tracks.len(), bases.len());
    Ok(tracks)
}

fn track(bone: &str, times: &[f32], samples: BoneSamples) -> Option<Track> {
    let translations = samples
        .translations
        .iter()
        .any(|t| differs(&t.to_array(), &[0.0; 3]))
        .then_some(samples.translations);
    let rotations = samples
        .rotations
        .iter()
        .any(|r| differs(&[r.w, r.x, r.y, r.z], &[1.0, 0.0, 0.0, 0.0]))
        .then_some(samples.rotations);
    let scales = samples
        .scales
        .iter()
        .any(|s| differs(&s.to_array(), &[1.0; 3]))
        .then_some(samples.scales);

    if translations.is_none() && rotations.is_none() && scales.is_none() {
        return None;
    }

    // A bone missing from some pose evaluations only keeps the frames it was sampled at.
    let keyframes = times
        .iter()
        .enumerate()
        .map_while(|(i, time)| {
            let translation = component(&translations, i)?;
            let rotation = component(&rotations, i)?;
            let scale = component(&scales, i)?;
            Some(Keyframe {
                time: *time,
                translation,
                rotation,
                scale,
            })
        })
        .collect();

    Some(Track {
        bone: bone.to_string(),
        keyframes,
    })
}

// Some(None) for unused components and None for a missing sample.
fn component<T: Copy>(values: &Option<Vec<T>>, i: usize) -> Option<Option<T>> {
    match values {
        Some(values) => values.get(i).map(|v| Some(*v)),
        None => Some(None),
    }
}

fn differs(values: &[f32], identity: &[f32]) -> bool {
    values
        .iter()
        .zip(identity)
        .any(|(v, i)| (v - i).abs() > IDENTITY_TOLERANCE)
}
