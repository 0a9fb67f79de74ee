use xmltree::Element;

use super::{element, fixed_vector_element, format_fixed, push};
use crate::{
    animation::{Animation, Keyframe},
    skeleton::Skeleton,
    transform::{angle_axis, to_ogre_bone_axes},
};

/// The `<skeleton>` document for `skeleton` and its sampled `animations`.
#[tracing::instrument(skip_all)]
pub fn skeleton_xml(skeleton: &Skeleton, animations: &[Animation]) -> Element {
    let mut root = Element::new("skeleton");

    let mut bones = Element::new("bones");
    for bone in &skeleton.bones {
        let mut element_bone = element(
            "bone",
            [("id", bone.id.to_string()), ("name", bone.name.clone())],
        );
        push(
            &mut element_bone,
            fixed_vector_element("position", bone.transform.translation),
        );
        let (angle, axis) = angle_axis(bone.transform.rotation);
        let mut rotation = element("rotation", [("angle", format_fixed(angle))]);
        push(&mut rotation, fixed_vector_element("axis", axis));
        push(&mut element_bone, rotation);
        push(&mut bones, element_bone);
    }
    push(&mut root, bones);

    let mut hierarchy = Element::new("bonehierarchy");
    for bone in &skeleton.bones {
        let parent = bone
            .parent_index
            .and_then(|id| skeleton.bones.iter().find(|b| b.id == id));
        if let Some(parent) = parent {
            push(
                &mut hierarchy,
                element(
                    "boneparent",
                    [("bone", bone.name.clone()), ("parent", parent.name.clone())],
                ),
            );
        }
    }
    push(&mut root, hierarchy);

    if !animations.is_empty() {
        let mut element_animations = Element::new("animations");
        for animation in animations {
            push(&mut element_animations, animation_element(animation));
        }
        push(&mut root, element_animations);
    }

    root
}

fn animation_element(animation: &Animation) -> Element {
    let mut element_animation = element(
        "animation",
        [
            ("name", animation.name.clone()),
            ("length", format_fixed(animation.length)),
        ],
    );

    let mut tracks = Element::new("tracks");
    for track in &animation.tracks {
        let mut element_track = element("track", [("bone", track.bone.clone())]);
        let mut keyframes = Element::new("keyframes");
        for keyframe in &track.keyframes {
            push(&mut keyframes, keyframe_element(keyframe));
        }
        push(&mut element_track, keyframes);
        push(&mut tracks, element_track);
    }
    push(&mut element_animation, tracks);

    element_animation
}

// Translations are already in the parent bone's space.
// Rotation axes and scales are still in the source bone axis order.
fn keyframe_element(keyframe: &Keyframe) -> Element {
    let mut element_keyframe = element("keyframe", [("time", format_fixed(keyframe.time))]);
    if let Some(translation) = keyframe.translation {
        push(
            &mut element_keyframe,
            fixed_vector_element("translate", translation),
        );
    }
    if let Some(rotation) = keyframe.rotation {
        let (angle, axis) = angle_axis(rotation);
        let mut rotate = element("rotate", [("angle", format_fixed(angle))]);
        push(
            &mut rotate,
            fixed_vector_element("axis", to_ogre_bone_axes(axis)),
        );
        push(&mut element_keyframe, rotate);
    }
    if let Some(scale) = keyframe.scale {
        push(
            &mut element_keyframe,
            fixed_vector_element("scale", to_ogre_bone_axes(scale)),
        );
    }
    element_keyframe
}
