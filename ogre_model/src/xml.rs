//! OGRE XML documents for meshes and skeletons.
//!
//! The XML files are converted to binary `.mesh` and `.skeleton` files
//! by the external OgreXMLConverter tool.
use std::path::Path;

use glam::Vec3;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::error::ExportError;

pub use mesh::mesh_xml;
pub use skeleton::skeleton_xml;

mod mesh;
mod skeleton;

/// Write `root` as an indented XML document to `path`.
pub fn write_xml(root: &Element, path: &Path) -> Result<(), ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_owned(),
        source,
    };

    let mut bytes = Vec::new();
    root.write_with_config(&mut bytes, emitter_config())
        .map_err(|e| io_error(std::io::Error::other(e.to_string())))?;
    std::fs::write(path, bytes).map_err(io_error)
}

fn emitter_config() -> EmitterConfig {
    EmitterConfig::new()
        .perform_indent(true)
        .indent_string("    ")
}

fn element<const N: usize>(name: &str, attributes: [(&str, String); N]) -> Element {
    let mut element = Element::new(name);
    for (key, value) in attributes {
        element.attributes.insert(key.to_string(), value);
    }
    element
}

fn push(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

// Geometry values are rounded to 7 decimal places.
// Rounding identical values the same way keeps them identical after conversion.
fn vector_element(name: &str, v: Vec3) -> Element {
    element(
        name,
        [
            ("x", format_coord(v.x)),
            ("y", format_coord(v.y)),
            ("z", format_coord(v.z)),
        ],
    )
}

fn fixed_vector_element(name: &str, v: Vec3) -> Element {
    element(
        name,
        [
            ("x", format_fixed(v.x)),
            ("y", format_fixed(v.y)),
            ("z", format_fixed(v.z)),
        ],
    )
}

/// Format a geometry value rounded to 7 decimal places.
pub fn format_coord(value: f32) -> String {
    let rounded = (value as f64 * 1e7).round() / 1e7;
    // Avoid writing negative zero.
    format!("{}", rounded + 0.0)
}

/// Format a value with 6 decimal places.
pub fn format_fixed(value: f32) -> String {
    format!("{:.6}", value + 0.0)
}
