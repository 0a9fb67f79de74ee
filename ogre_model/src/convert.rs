//! Running OgreXMLConverter on the written XML files.
use std::{
    path::{Path, PathBuf},
    process::Command,
};

use log::{info, warn};

use crate::error::ExportWarning;

/// Convert `xml` to its binary form with the `converter` executable.
///
/// Returns the path of the binary file created next to `xml`.
/// The XML file is deleted after a successful conversion unless `keep_xml` is `true`.
#[tracing::instrument(skip_all)]
pub fn run_converter(converter: &Path, xml: &Path, keep_xml: bool) -> Result<PathBuf, ExportWarning> {
    let failure = |reason: String| ExportWarning::ExternalCompilerFailure {
        path: xml.to_owned(),
        reason,
    };

    info!("Converting {xml:?} with {converter:?}");
    let status = Command::new(converter)
        .arg(xml)
        .status()
        .map_err(|e| failure(e.to_string()))?;
    if !status.success() {
        return Err(failure(format!("converter exited with {status}")));
    }

    // "model.mesh.xml" converts to "model.mesh".
    let output = xml.with_extension("");
    if !output.is_file() {
        return Err(failure(format!("converter did not create {output:?}")));
    }

    if !keep_xml {
        if let Err(e) = std::fs::remove_file(xml) {
            warn!("Failed to remove {xml:?}: {e}");
        }
    }
    Ok(output)
}

/// Convert each of `xmls`, collecting failures as warnings.
pub fn convert_all(
    converter: &Path,
    xmls: &[PathBuf],
    keep_xml: bool,
) -> (Vec<PathBuf>, Vec<ExportWarning>) {
    let mut converted = Vec::new();
    let mut warnings = Vec::new();
    for xml in xmls {
        match run_converter(converter, xml, keep_xml) {
            Ok(output) => converted.push(output),
            Err(warning) => {
                warn!("{warning}");
                warnings.push(warning);
            }
        }
    }
    (converted, warnings)
}
