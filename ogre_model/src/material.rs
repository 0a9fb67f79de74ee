//! OGRE material scripts and texture copying.
use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

use glam::Vec3;
use indexmap::IndexMap;
use log::{info, warn};

use crate::{
    error::ExportWarning,
    scene::{SceneObject, SourceMaterial},
};

#[derive(Debug, PartialEq, Clone)]
pub struct Material {
    pub name: String,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub textures: Vec<TextureRef>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TextureRef {
    /// The image name written to the material script.
    pub name: String,
    /// The image file path as stored by the host.
    pub path: String,
}

impl Material {
    pub fn from_source(material: &SourceMaterial) -> Self {
        Self {
            name: material.name.clone(),
            ambient: Vec3::splat(material.ambient),
            diffuse: material.diffuse,
            specular: material.specular,
            emissive: Vec3::splat(material.emit),
            textures: material
                .textures
                .iter()
                .map(|t| TextureRef {
                    name: t.image.clone(),
                    path: t.path.clone(),
                })
                .collect(),
        }
    }
}

/// Find the materials used by `objects` in the order they are first referenced.
///
/// Slots naming a material missing from `materials` produce a warning.
#[tracing::instrument(skip_all)]
pub fn collect_materials(
    objects: &[SceneObject],
    materials: &[SourceMaterial],
) -> (IndexMap<String, Material>, Vec<ExportWarning>) {
    let mut used = IndexMap::new();
    let mut warnings = Vec::new();

    for name in objects.iter().flat_map(|o| o.material_slots.iter().flatten()) {
        if used.contains_key(name) {
            continue;
        }
        match materials.iter().find(|m| &m.name == name) {
            Some(material) => {
                used.insert(name.clone(), Material::from_source(material));
            }
            None => {
                let warning = ExportWarning::UndefinedMaterial { name: name.clone() };
                if !warnings.contains(&warning) {
                    warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }
    }

    (used, warnings)
}

/// The text of a `.material` script defining `materials`.
pub fn material_script<'a, I: IntoIterator<Item = &'a Material>>(materials: I) -> String {
    let mut script = String::new();
    for m in materials {
        // Writing to a String can't fail.
        let _ = write_material(&mut script, m);
    }
    script
}

fn write_material(w: &mut String, m: &Material) -> std::fmt::Result {
    writeln!(w, "material {}", m.name)?;
    writeln!(w, "{{")?;
    writeln!(w, "{}technique", indent(1))?;
    writeln!(w, "{}{{", indent(1))?;
    writeln!(w, "{}pass", indent(2))?;
    writeln!(w, "{}{{", indent(2))?;
    writeln!(w, "{}ambient {}", indent(3), color(m.ambient))?;
    writeln!(w, "{}diffuse {}", indent(3), color(m.diffuse))?;
    writeln!(w, "{}specular {} 0", indent(3), color(m.specular))?;
    writeln!(w, "{}emissive {}", indent(3), color(m.emissive))?;
    for texture in &m.textures {
        writeln!(w, "{}texture_unit", indent(3))?;
        writeln!(w, "{}{{", indent(3))?;
        writeln!(w, "{}texture {}", indent(4), texture.name)?;
        writeln!(w, "{}}}", indent(3))?;
    }
    writeln!(w, "{}}}", indent(2))?;
    writeln!(w, "{}}}", indent(1))?;
    writeln!(w, "}}")
}

fn indent(level: usize) -> String {
    " ".repeat(8 * level)
}

fn color(c: Vec3) -> String {
    format!("{:.6} {:.6} {:.6}", c.x, c.y, c.z)
}

/// Write the material script to `path` unless the file exists and `overwrite` is `false`.
///
/// Returns `true` if the file was written.
pub fn save_material_file(
    path: &Path,
    materials: &IndexMap<String, Material>,
    overwrite: bool,
) -> std::io::Result<bool> {
    if materials.is_empty() {
        info!("No materials to write");
        return Ok(false);
    }
    if path.exists() && !overwrite {
        info!("Keeping existing material file {path:?}");
        return Ok(false);
    }

    std::fs::write(path, material_script(materials.values()))?;
    Ok(true)
}

/// Resolve a texture path from the host.
/// Paths starting with `//` are relative to `base_dir`.
pub fn resolve_texture_path(path: &str, base_dir: Option<&Path>) -> PathBuf {
    match path.strip_prefix("//") {
        Some(relative) => base_dir
            .map(|dir| dir.join(relative))
            .unwrap_or_else(|| PathBuf::from(relative)),
        None => PathBuf::from(path),
    }
}

/// Copy the texture files for `materials` into `output_dir`.
///
/// Failures do not stop the export and are returned as warnings.
#[tracing::instrument(skip_all)]
pub fn copy_textures(
    materials: &IndexMap<String, Material>,
    base_dir: Option<&Path>,
    output_dir: &Path,
) -> Vec<ExportWarning> {
    let mut warnings = Vec::new();
    for texture in materials.values().flat_map(|m| &m.textures) {
        let source = resolve_texture_path(&texture.path, base_dir);
        if let Err(reason) = copy_texture(&source, output_dir) {
            let warning = ExportWarning::AssetCopyFailure {
                path: source,
                reason,
            };
            warn!("{warning}");
            warnings.push(warning);
        }
    }
    warnings
}

fn copy_texture(source: &Path, output_dir: &Path) -> Result<(), String> {
    if !source.is_file() {
        return Err("file does not exist".to_string());
    }
    let file_name = source
        .file_name()
        .ok_or_else(|| "path has no file name".to_string())?;
    let destination = output_dir.join(file_name);
    if destination == source {
        return Ok(());
    }

    info!("Copying texture {source:?} to {destination:?}");
    std::fs::copy(source, destination)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::vec3;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use crate::scene::TextureSlot;

    fn material(name: &str) -> SourceMaterial {
        SourceMaterial {
            name: name.to_string(),
            ambient: 0.5,
            diffuse: vec3(0.8, 0.6, 0.4),
            specular: vec3(1.0, 1.0, 1.0),
            emit: 0.25,
            textures: vec![TextureSlot {
                image: "wood.png".to_string(),
                path: "//textures/wood.png".to_string(),
            }],
        }
    }

    fn object(slots: &[Option<&str>]) -> SceneObject {
        SceneObject {
            material_slots: slots.iter().map(|s| s.map(Into::into)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn collect_materials_first_use_order() {
        let (materials, warnings) = collect_materials(
            &[
                object(&[Some("b"), None, Some("a")]),
                object(&[Some("a"), Some("b")]),
            ],
            &[material("a"), material("b"), material("unused")],
        );
        assert_eq!(
            vec!["b", "a"],
            materials.keys().map(|k| k.as_str()).collect::<Vec<_>>()
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn collect_materials_undefined() {
        let (materials, warnings) = collect_materials(
            &[object(&[Some("missing")]), object(&[Some("missing")])],
            &[],
        );
        assert!(materials.is_empty());
        assert_eq!(
            vec![ExportWarning::UndefinedMaterial {
                name: "missing".to_string()
            }],
            warnings
        );
    }

    #[test]
    fn material_script_single_texture() {
        let material = Material::from_source(&material("wood"));
        assert_eq!(
            indoc! {"
                material wood
                {
                        technique
                        {
                                pass
                                {
                                        ambient 0.500000 0.500000 0.500000
                                        diffuse 0.800000 0.600000 0.400000
                                        specular 1.000000 1.000000 1.000000 0
                                        emissive 0.250000 0.250000 0.250000
                                        texture_unit
                                        {
                                                texture wood.png
                                        }
                                }
                        }
                }
            "},
            material_script([&material])
        );
    }

    #[test]
    fn material_script_no_textures() {
        let material = Material {
            textures: Vec::new(),
            ..Material::from_source(&material("plain"))
        };
        let script = material_script([&material, &material]);
        assert_eq!(2, script.matches("material plain\n").count());
        assert!(!script.contains("texture_unit"));
    }

    #[test]
    fn material_script_every_material_in_order() {
        let wood = Material::from_source(&material("wood"));
        let stone = Material::from_source(&material("stone"));
        let script = material_script([&wood, &stone]);
        let wood_start = script.find("material wood\n").unwrap();
        let stone_start = script.find("material stone\n").unwrap();
        assert!(wood_start < stone_start);
        assert_eq!(2, script.matches("texture_unit").count());
        assert!(script.ends_with("}\n"));
    }

    #[test]
    fn resolve_relative_texture_path() {
        assert_eq!(
            Path::new("/scenes/textures/wood.png"),
            resolve_texture_path("//textures/wood.png", Some(Path::new("/scenes")))
        );
        assert_eq!(
            Path::new("textures/wood.png"),
            resolve_texture_path("//textures/wood.png", None)
        );
        assert_eq!(
            Path::new("/abs/wood.png"),
            resolve_texture_path("/abs/wood.png", Some(Path::new("/scenes")))
        );
    }

    #[test]
    fn copy_missing_texture_warns() {
        let materials = IndexMap::from([(
            "wood".to_string(),
            Material::from_source(&material("wood")),
        )]);
        let base = Path::new("/nonexistent_ogre_model_dir");
        let warnings = copy_textures(&materials, Some(base), &std::env::temp_dir());
        assert_eq!(
            vec![ExportWarning::AssetCopyFailure {
                path: base.join("textures/wood.png"),
                reason: "file does not exist".to_string()
            }],
            warnings
        );
    }
}
