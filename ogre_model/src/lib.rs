//! # ogre_model
//! ogre_model converts resolved scene data into OGRE XML meshes, skeletons, and material scripts.
//!
//! The [Scene] describes the selected objects, their materials, and an optional armature.
//! [export_mesh] writes the `.mesh.xml`, `.skeleton.xml`, and `.material` files
//! and optionally runs OgreXMLConverter to create the binary files.
//!
//! # Getting Started
//! ```rust no_run
//! use ogre_model::{ExportSettings, Scene, export_mesh};
//!
//! let scene = Scene::default();
//! let settings = ExportSettings {
//!     export_skeleton: true,
//!     export_animation: true,
//!     ..Default::default()
//! };
//! let report = export_mesh(&scene, "out/character.mesh", &settings)?;
//! for warning in &report.warnings {
//!     println!("{warning}");
//! }
//! # Ok::<(), ogre_model::error::ExportError>(())
//! ```
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use log::info;

use crate::{
    convert::convert_all,
    error::{ExportError, ExportWarning},
    material::{copy_textures, save_material_file},
    xml::{mesh_xml, skeleton_xml, write_xml},
};

pub use animation::AnimationHost;
pub use model::MeshModel;
pub use scene::Scene;
pub use skeleton::BoneIdRegistry;

pub mod animation;
pub mod convert;
pub mod error;
pub mod geometry;
pub mod material;
mod model;
pub mod pose;
pub mod scene;
pub mod skeleton;
pub mod tangent;
pub mod transform;
pub mod vertex;
pub mod xml;

/// How faces are divided into submeshes.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub enum SubmeshGrouping {
    /// One submesh for each material shared across all objects.
    #[default]
    Material,
    /// One submesh for each object using the object's first material.
    Object,
}

/// Options controlling which data is exported.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ExportSettings {
    pub export_tangents: bool,
    /// Also write binormals. Only used if tangents are exported.
    pub export_binormals: bool,
    pub export_colour: bool,
    pub export_poses: bool,
    /// Write the `.skeleton.xml` and link it from the mesh.
    /// Otherwise the mesh links to an existing skeleton named after the armature.
    pub export_skeleton: bool,
    pub export_animation: bool,
    /// Replace an existing `.material` file.
    pub overwrite_material: bool,
    /// Copy texture images next to the `.material` file.
    pub copy_textures: bool,
    /// Keep the XML files after converting them.
    pub keep_xml: bool,
    /// The path to the OgreXMLConverter executable.
    pub converter: Option<PathBuf>,
    pub submesh_grouping: SubmeshGrouping,
}

/// The files created by an export and any recoverable problems.
#[derive(Debug, PartialEq, Clone)]
pub struct ExportReport {
    pub mesh_xml: PathBuf,
    pub skeleton_xml: Option<PathBuf>,
    /// The material script or `None` if an existing file was kept.
    pub material: Option<PathBuf>,
    /// Binary files created by the converter.
    pub converted: Vec<PathBuf>,
    pub warnings: Vec<ExportWarning>,
}

/// The output file paths for a mesh export.
#[derive(Debug, PartialEq, Clone)]
pub struct ExportPaths {
    /// The binary `.mesh` path.
    pub mesh: PathBuf,
    pub mesh_xml: PathBuf,
    pub skeleton_xml: PathBuf,
    pub material: PathBuf,
}

impl ExportPaths {
    /// Output paths for `path` with `.mesh` appended if not already present.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mesh = if has_mesh_extension(path) {
            path.to_owned()
        } else {
            append(path, ".mesh")
        };
        let stem = mesh.with_extension("");

        Self {
            mesh_xml: append(&mesh, ".xml"),
            skeleton_xml: append(&stem, ".skeleton.xml"),
            material: append(&stem, ".material"),
            mesh,
        }
    }

    /// The skeleton name referenced by the mesh when exporting the skeleton.
    pub fn skeleton_link(&self) -> String {
        let stem = self
            .mesh
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        format!("{stem}.skeleton")
    }
}

fn has_mesh_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mesh"))
}

fn append(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

/// Export `scene` to `path` using bone indices from previous exports in this process.
pub fn export_mesh<P: AsRef<Path>>(
    scene: &Scene,
    path: P,
    settings: &ExportSettings,
) -> Result<ExportReport, ExportError> {
    let mut registry = BoneIdRegistry::global();
    export_mesh_with_bone_ids(scene, path, settings, &mut registry)
}

/// Export `scene` to `path` using and updating the bone indices in `registry`.
#[tracing::instrument(skip_all)]
pub fn export_mesh_with_bone_ids<P: AsRef<Path>>(
    scene: &Scene,
    path: P,
    settings: &ExportSettings,
    registry: &mut BoneIdRegistry,
) -> Result<ExportReport, ExportError> {
    let (model, mut warnings) = MeshModel::from_scene(scene, settings, registry)?;
    let mut report = write_model(&model, path, settings, scene.base_dir.as_deref())?;
    warnings.append(&mut report.warnings);
    report.warnings = warnings;
    Ok(report)
}

/// Write the files for an already converted `model`.
///
/// Relative texture paths are resolved using `base_dir`.
#[tracing::instrument(skip_all)]
pub fn write_model<P: AsRef<Path>>(
    model: &MeshModel,
    path: P,
    settings: &ExportSettings,
    base_dir: Option<&Path>,
) -> Result<ExportReport, ExportError> {
    let paths = ExportPaths::new(path);
    let mut warnings = Vec::new();

    let skeleton_link = model.skeleton.as_ref().map(|skeleton| {
        if settings.export_skeleton {
            paths.skeleton_link()
        } else {
            format!("{}.skeleton", skeleton.name)
        }
    });

    info!("Writing {:?}", paths.mesh_xml);
    write_xml(
        &mesh_xml(model, skeleton_link.as_deref()),
        &paths.mesh_xml,
    )?;
    let mut xmls = vec![paths.mesh_xml.clone()];

    let mut skeleton_xml_path = None;
    if settings.export_skeleton {
        if let Some(skeleton) = &model.skeleton {
            info!("Writing {:?}", paths.skeleton_xml);
            write_xml(
                &skeleton_xml(skeleton, &model.animations),
                &paths.skeleton_xml,
            )?;
            xmls.push(paths.skeleton_xml.clone());
            skeleton_xml_path = Some(paths.skeleton_xml.clone());
        }
    }

    let material = save_material_file(
        &paths.material,
        &model.materials,
        settings.overwrite_material,
    )
    .map_err(|source| ExportError::Io {
        path: paths.material.clone(),
        source,
    })?
    .then(|| paths.material.clone());

    if settings.copy_textures {
        let output_dir = paths.material.parent().unwrap_or(Path::new(""));
        warnings.extend(copy_textures(&model.materials, base_dir, output_dir));
    }

    let mut converted = Vec::new();
    if let Some(converter) = &settings.converter {
        let (outputs, convert_warnings) = convert_all(converter, &xmls, settings.keep_xml);
        converted = outputs;
        warnings.extend(convert_warnings);
    }

    Ok(ExportReport {
        mesh_xml: paths.mesh_xml,
        skeleton_xml: skeleton_xml_path,
        material,
        converted,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn export_paths_append_extension() {
        assert_eq!(
            ExportPaths {
                mesh: PathBuf::from("out/Hero.mesh"),
                mesh_xml: PathBuf::from("out/Hero.mesh.xml"),
                skeleton_xml: PathBuf::from("out/Hero.skeleton.xml"),
                material: PathBuf::from("out/Hero.material"),
            },
            ExportPaths::new("out/Hero")
        );
    }

    #[test]
    fn export_paths_existing_extension() {
        assert_eq!(
            ExportPaths {
                mesh: PathBuf::from("out/Hero.MESH"),
                mesh_xml: PathBuf::from("out/Hero.MESH.xml"),
                skeleton_xml: PathBuf::from("out/Hero.skeleton.xml"),
                material: PathBuf::from("out/Hero.material"),
            },
            ExportPaths::new("out/Hero.MESH")
        );
    }

    #[test]
    fn export_paths_dotted_name() {
        let paths = ExportPaths::new("out/hero.v2");
        assert_eq!(PathBuf::from("out/hero.v2.mesh"), paths.mesh);
        assert_eq!(PathBuf::from("out/hero.v2.skeleton.xml"), paths.skeleton_xml);
        assert_eq!("hero.v2.skeleton", paths.skeleton_link());
    }

    #[test]
    fn skeleton_link_lowercase() {
        assert_eq!("hero.skeleton", ExportPaths::new("out/Hero.mesh").skeleton_link());
    }

    #[test]
    fn default_settings() {
        let settings = ExportSettings::default();
        assert_eq!(SubmeshGrouping::Material, settings.submesh_grouping);
        assert_eq!(None, settings.converter);
        assert!(!settings.export_skeleton);
    }
}
