//! Bone index allocation and rest poses in OGRE's coordinate system.
use std::{
    collections::BTreeMap,
    sync::{LazyLock, Mutex, MutexGuard, PoisonError},
};

use glam::{Mat4, Quat};
use indexmap::IndexMap;
use log::{debug, warn};

use crate::{
    error::CreateSkeletonError,
    scene::Armature,
    transform::{Transform, bone_axis_fix, z_up_to_y_up},
};

static BONE_IDS: LazyLock<Mutex<BoneIdRegistry>> =
    LazyLock::new(|| Mutex::new(BoneIdRegistry::default()));

/// The bone indices assigned by previous exports for each armature.
///
/// Existing OGRE animation files reference bones by index.
/// Reusing the same indices when exporting a rig again keeps those files valid.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct BoneIdRegistry {
    /// Bone name to bone index for each armature name.
    pub rigs: BTreeMap<String, BTreeMap<String, usize>>,
}

impl BoneIdRegistry {
    /// The registry shared by all exports in this process. This starts empty.
    pub fn global() -> MutexGuard<'static, BoneIdRegistry> {
        // The registry is always left in a valid state, so a poisoned lock can be reused.
        BONE_IDS.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ids(&self, rig: &str) -> Option<&BTreeMap<String, usize>> {
        self.rigs.get(rig)
    }

    /// Add or replace the bone indices for `rig`.
    pub fn merge<I: IntoIterator<Item = (String, usize)>>(&mut self, rig: &str, ids: I) {
        self.rigs.entry(rig.to_string()).or_default().extend(ids);
    }
}

/// The bone hierarchy written to the `.skeleton` file.
#[derive(Debug, PartialEq, Clone)]
pub struct Skeleton {
    /// The armature name used when linking to a skeleton file that was not exported.
    pub name: String,
    /// The bones ordered by [id](struct.Bone.html#structfield.id).
    pub bones: Vec<Bone>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Bone {
    pub name: String,
    /// The index used to reference this bone in bone assignments.
    pub id: usize,
    /// The rest pose relative to the parent in OGRE's Y-up coordinates.
    pub transform: Transform,
    /// The [id](struct.Bone.html#structfield.id) of the parent bone
    /// or `None` if this is a root bone.
    pub parent_index: Option<usize>,
}

impl Skeleton {
    /// Assign bone indices and calculate rest poses for `armature`.
    ///
    /// Indices saved on the bones themselves take priority over indices in `registry`.
    /// The final indices are merged back into `registry` for the next export.
    #[tracing::instrument(skip_all)]
    pub fn from_armature(
        armature: &Armature,
        registry: &mut BoneIdRegistry,
    ) -> Result<Self, CreateSkeletonError> {
        let mut name_to_index = IndexMap::new();
        for (i, bone) in armature.bones.iter().enumerate() {
            if name_to_index.insert(bone.name.as_str(), i).is_some() {
                return Err(CreateSkeletonError::DuplicateBoneName {
                    armature: armature.name.clone(),
                    name: bone.name.clone(),
                });
            }
        }

        let parents = parent_indices(armature, &name_to_index)?;
        let ids = assign_bone_ids(armature, registry.ids(&armature.name))?;

        let rest: Vec<_> = armature
            .bones
            .iter()
            .zip(&parents)
            .map(|(bone, parent)| {
                let parent_matrix = parent.map(|p| armature.bones[p].rest_matrix);
                rest_transform(bone.rest_matrix, parent_matrix)
            })
            .collect();

        let mut bones: Vec<_> = armature
            .bones
            .iter()
            .enumerate()
            .map(|(i, bone)| Bone {
                name: bone.name.clone(),
                id: ids[i],
                transform: rest[i],
                parent_index: parents[i].map(|p| ids[p]),
            })
            .collect();
        bones.sort_by_key(|b| b.id);

        registry.merge(
            &armature.name,
            bones.iter().map(|b| (b.name.clone(), b.id)),
        );

        Ok(Self {
            name: armature.name.clone(),
            bones,
        })
    }

    /// The index of the bone named `name` if present.
    pub fn bone_id(&self, name: &str) -> Option<usize> {
        self.bones.iter().find(|b| b.name == name).map(|b| b.id)
    }
}

fn parent_indices(
    armature: &Armature,
    name_to_index: &IndexMap<&str, usize>,
) -> Result<Vec<Option<usize>>, CreateSkeletonError> {
    let parents = armature
        .bones
        .iter()
        .map(|bone| {
            bone.parent
                .as_ref()
                .map(|parent| {
                    name_to_index.get(parent.as_str()).copied().ok_or_else(|| {
                        CreateSkeletonError::MissingParent {
                            bone: bone.name.clone(),
                            parent: parent.clone(),
                        }
                    })
                })
                .transpose()
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Any chain longer than the bone count must repeat a bone.
    for (i, bone) in armature.bones.iter().enumerate() {
        let mut current = parents[i];
        let mut depth = 0;
        while let Some(p) = current {
            depth += 1;
            if p == i || depth > parents.len() {
                return Err(CreateSkeletonError::CyclicParent {
                    bone: bone.name.clone(),
                });
            }
            current = parents[p];
        }
    }

    Ok(parents)
}

// The bone id for each bone in armature order.
fn assign_bone_ids(
    armature: &Armature,
    registered: Option<&BTreeMap<String, usize>>,
) -> Result<Vec<usize>, CreateSkeletonError> {
    let bone_count = armature.bones.len();
    let mut slots: Vec<Option<usize>> = vec![None; bone_count];
    let mut ids: Vec<Option<usize>> = vec![None; bone_count];

    for (i, bone) in armature.bones.iter().enumerate() {
        if let Some(id) = bone.persisted_id {
            match slots.get(id) {
                Some(Some(other)) => {
                    return Err(CreateSkeletonError::DuplicateBoneId {
                        id,
                        first: armature.bones[*other].name.clone(),
                        second: bone.name.clone(),
                    });
                }
                Some(None) => {
                    slots[id] = Some(i);
                    ids[i] = Some(id);
                }
                None => {
                    return Err(CreateSkeletonError::BoneIdOutOfRange {
                        bone: bone.name.clone(),
                        id,
                        bone_count,
                    });
                }
            }
        }
    }

    if let Some(registered) = registered {
        for (i, bone) in armature.bones.iter().enumerate() {
            if ids[i].is_some() {
                continue;
            }
            if let Some(id) = registered.get(&bone.name).copied() {
                if slots.get(id) == Some(&None) {
                    slots[id] = Some(i);
                    ids[i] = Some(id);
                } else {
                    warn!(
                        "Ignoring registered id {id} for bone {:?} in armature {:?}",
                        bone.name, armature.name
                    );
                }
            }
        }
    }

    let mut next = 0;
    ids.iter()
        .enumerate()
        .map(|(i, id)| match id {
            Some(id) => Ok(*id),
            None => {
                while slots.get(next).is_some_and(|s| s.is_some()) {
                    next += 1;
                }
                slots[next] = Some(i);
                debug!("Assigned id {next} to bone {:?}", armature.bones[i].name);
                Ok(next)
            }
        })
        .collect()
}

/// The rest pose relative to the parent with OGRE's Y-up coordinates and X forward bone axis.
/// Matrices are in armature space.
pub fn rest_transform(matrix: Mat4, parent_matrix: Option<Mat4>) -> Transform {
    let rot = z_up_to_y_up();
    let fix = bone_axis_fix();

    let rest = match parent_matrix {
        Some(parent) => (parent * fix * rot).inverse() * matrix * fix * rot,
        None => rot * matrix * fix * rot,
    };

    let (scale, rotation, translation) = rest.to_scale_rotation_translation();
    Transform {
        translation,
        rotation: canonical(rotation),
        scale,
    }
}

// Use the quaternion with a non negative w to keep the angle in [0, pi].
fn canonical(q: Quat) -> Quat {
    if q.w < 0.0 { -q } else { q }
}
