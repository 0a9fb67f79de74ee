use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::{info, warn};
use ogre_model::{
    BoneIdRegistry, ExportSettings, Scene, SubmeshGrouping, export_mesh_with_bone_ids,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// The scene JSON file.
    input: PathBuf,
    /// The output .mesh file. Defaults to the input path with the mesh extension.
    output: Option<PathBuf>,
    /// Calculate and write vertex tangents.
    #[arg(long)]
    tangents: bool,
    /// Also write binormals when writing tangents.
    #[arg(long)]
    binormals: bool,
    /// Write vertex colors from the active color layer.
    #[arg(long)]
    colour: bool,
    /// Write shape keys as poses.
    #[arg(long)]
    poses: bool,
    /// Write a .skeleton.xml for the armature and link it from the mesh.
    #[arg(long)]
    skeleton: bool,
    /// Write the armature's actions as skeleton animations.
    #[arg(long)]
    animation: bool,
    /// Replace an existing .material file.
    #[arg(long)]
    overwrite_material: bool,
    /// Copy texture images next to the .material file.
    #[arg(long)]
    copy_textures: bool,
    /// Keep the XML files after running the converter.
    #[arg(long)]
    keep_xml: bool,
    /// The OgreXMLConverter executable used to create binary files.
    #[arg(long)]
    converter: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Grouping::Material)]
    grouping: Grouping,
    /// A JSON file storing bone indices between exports.
    /// The file is created if it does not exist.
    #[arg(long)]
    bone_ids: Option<PathBuf>,
    /// Also print debug logs.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Grouping {
    /// One submesh per material.
    Material,
    /// One submesh per object.
    Object,
}

impl From<Grouping> for SubmeshGrouping {
    fn from(value: Grouping) -> Self {
        match value {
            Grouping::Material => SubmeshGrouping::Material,
            Grouping::Object => SubmeshGrouping::Object,
        }
    }
}

impl Cli {
    fn settings(&self) -> ExportSettings {
        ExportSettings {
            export_tangents: self.tangents,
            export_binormals: self.binormals,
            export_colour: self.colour,
            export_poses: self.poses,
            export_skeleton: self.skeleton,
            export_animation: self.animation,
            overwrite_material: self.overwrite_material,
            copy_textures: self.copy_textures,
            keep_xml: self.keep_xml,
            converter: self.converter.clone(),
            submesh_grouping: self.grouping.into(),
        }
    }

    #[cfg(not(feature = "tracing"))]
    fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }

    #[cfg(feature = "tracing")]
    fn tracing_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    #[cfg(not(feature = "tracing"))]
    simple_logger::SimpleLogger::new()
        .with_level(cli.log_level())
        .init()
        .context("failed to initialize logger")?;

    #[cfg(feature = "tracing")]
    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_max_level(cli.tracing_level())
            .finish(),
    )
    .context("failed to initialize tracing")?;

    let start = std::time::Instant::now();

    let scene = read_scene(&cli.input)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("mesh"));

    let mut registry = match &cli.bone_ids {
        Some(path) if path.exists() => read_bone_ids(path)?,
        _ => BoneIdRegistry::default(),
    };

    let report = export_mesh_with_bone_ids(&scene, &output, &cli.settings(), &mut registry)
        .with_context(|| format!("failed to export {output:?}"))?;

    if let Some(path) = &cli.bone_ids {
        write_bone_ids(path, &registry)?;
    }

    info!("Wrote {:?}", report.mesh_xml);
    if let Some(path) = &report.skeleton_xml {
        info!("Wrote {path:?}");
    }
    if let Some(path) = &report.material {
        info!("Wrote {path:?}");
    }
    for path in &report.converted {
        info!("Converted {path:?}");
    }
    for warning in &report.warnings {
        warn!("{warning}");
    }

    info!("Finished export in {:?}", start.elapsed());
    Ok(())
}

fn read_scene(path: &Path) -> anyhow::Result<Scene> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse scene {path:?}"))
}

fn read_bone_ids(path: &Path) -> anyhow::Result<BoneIdRegistry> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse bone ids {path:?}"))
}

fn write_bone_ids(path: &Path, registry: &BoneIdRegistry) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(registry)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_enables_debug() {
        let verbose = Cli::parse_from(["ogre_export", "scene.json", "--verbose"]);
        let quiet = Cli::parse_from(["ogre_export", "scene.json"]);

        #[cfg(not(feature = "tracing"))]
        {
            assert_eq!(log::LevelFilter::Debug, verbose.log_level());
            assert_eq!(log::LevelFilter::Info, quiet.log_level());
        }

        #[cfg(feature = "tracing")]
        {
            assert_eq!(tracing::Level::DEBUG, verbose.tracing_level());
            assert_eq!(tracing::Level::INFO, quiet.tracing_level());
        }
    }

    #[test]
    fn settings_from_flags() {
        let cli = Cli::parse_from([
            "ogre_export",
            "scene.json",
            "--skeleton",
            "--grouping",
            "object",
        ]);
        let settings = cli.settings();
        assert!(settings.export_skeleton);
        assert!(!settings.export_animation);
        assert_eq!(SubmeshGrouping::Object, settings.submesh_grouping);
    }
}
