//! Pascal VOC XML reader and writer.
//!
//! VOC stores one XML file per image with absolute pixel boxes, so records
//! map one-to-one onto files. The canonical IR remains pixel-space XYXY.

use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::Node;

use super::{BBox, ImageRecord};
use crate::error::UnilabelError;

pub const VOC_XML_EXTENSION: &str = "xml";

const DEFAULT_FOLDER: &str = "Unspecified";
const DEFAULT_DEPTH: u32 = 3;

/// Reads one VOC XML file into an IR record.
///
/// The record's image path is the XML's directory joined with `<filename>`.
pub fn read_voc_xml(path: &Path) -> Result<ImageRecord, UnilabelError> {
    let xml = fs::read_to_string(path).map_err(|source| UnilabelError::io_at(path, source))?;
    from_voc_xml_str(&xml, path)
}

/// Parses VOC XML from a UTF-8 string.
///
/// `path` is the location the XML was read from; it is used to resolve the
/// image path and in error messages.
pub fn from_voc_xml_str(xml: &str, path: &Path) -> Result<ImageRecord, UnilabelError> {
    let document =
        roxmltree::Document::parse(xml).map_err(|source| UnilabelError::VocXmlParse {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(UnilabelError::VocXmlParse {
            path: path.to_path_buf(),
            message: "missing <annotation> root element".to_string(),
        });
    }

    let filename = required_child_text(annotation, "filename", path, "<annotation>")?;

    let size = required_child_element(annotation, "size", path, "<annotation>")?;
    let width = parse_required_u32(size, "width", path, "<size>")?;
    let height = parse_required_u32(size, "height", path, "<size>")?;

    let image_path = path
        .parent()
        .map(|dir| dir.join(&filename))
        .unwrap_or_else(|| PathBuf::from(&filename));

    let mut record = ImageRecord::new(filename, image_path, width, height);

    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let name = required_child_text(object, "name", path, "<object>")?;
        let bndbox = required_child_element(object, "bndbox", path, "<object>")?;

        let xmin = parse_required_f64(bndbox, "xmin", path, "<bndbox>")?;
        let ymin = parse_required_f64(bndbox, "ymin", path, "<bndbox>")?;
        let xmax = parse_required_f64(bndbox, "xmax", path, "<bndbox>")?;
        let ymax = parse_required_f64(bndbox, "ymax", path, "<bndbox>")?;

        record.bboxes.push(BBox::new(name, xmin, ymin, xmax, ymax));
    }

    Ok(record)
}

/// Parses VOC XML from bytes.
///
/// The input must be valid UTF-8.
pub fn from_voc_xml_slice(bytes: &[u8]) -> Result<ImageRecord, UnilabelError> {
    let xml = std::str::from_utf8(bytes).map_err(|source| UnilabelError::VocXmlParse {
        path: PathBuf::from("<memory>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    from_voc_xml_str(xml, Path::new("<memory>"))
}

/// Writes one record as `<stem>.xml` inside `output_dir`.
///
/// Creates `output_dir` if needed and returns the path written.
pub fn write_voc_xml(record: &ImageRecord, output_dir: &Path) -> Result<PathBuf, UnilabelError> {
    fs::create_dir_all(output_dir).map_err(|source| UnilabelError::io_at(output_dir, source))?;

    let xml = to_voc_xml_string(record)?;
    let xml_path = output_dir.join(record.annotation_file_name(VOC_XML_EXTENSION));
    fs::write(&xml_path, xml).map_err(|source| UnilabelError::io_at(&xml_path, source))?;
    Ok(xml_path)
}

/// Renders one record as VOC XML (two-space indentation, no declaration).
///
/// Coordinates are truncated toward zero, the way VOC tools expect integers.
pub fn to_voc_xml_string(record: &ImageRecord) -> Result<String, UnilabelError> {
    let mut xml = String::new();
    render_voc_xml(&mut xml, record).map_err(|_| UnilabelError::VocXmlWrite {
        filename: record.filename.clone(),
    })?;
    Ok(xml)
}

fn render_voc_xml(xml: &mut String, record: &ImageRecord) -> fmt::Result {
    writeln!(xml, "<annotation>")?;
    writeln!(xml, "  <folder>{}</folder>", xml_escape(&folder_name(&record.image_path)))?;
    writeln!(xml, "  <filename>{}</filename>", xml_escape(&record.filename))?;
    writeln!(
        xml,
        "  <path>{}</path>",
        xml_escape(&absolute_path(&record.image_path).to_string_lossy())
    )?;
    writeln!(xml, "  <source>")?;
    writeln!(xml, "    <database>Unknown</database>")?;
    writeln!(xml, "  </source>")?;
    writeln!(xml, "  <size>")?;
    writeln!(xml, "    <width>{}</width>", record.width)?;
    writeln!(xml, "    <height>{}</height>", record.height)?;
    writeln!(xml, "    <depth>{}</depth>", DEFAULT_DEPTH)?;
    writeln!(xml, "  </size>")?;
    writeln!(xml, "  <segmented>0</segmented>")?;

    for bbox in &record.bboxes {
        writeln!(xml, "  <object>")?;
        writeln!(xml, "    <name>{}</name>", xml_escape(&bbox.label))?;
        writeln!(xml, "    <pose>Unspecified</pose>")?;
        writeln!(xml, "    <truncated>0</truncated>")?;
        writeln!(xml, "    <difficult>0</difficult>")?;
        writeln!(xml, "    <bndbox>")?;
        writeln!(xml, "      <xmin>{}</xmin>", truncate(bbox.xmin))?;
        writeln!(xml, "      <ymin>{}</ymin>", truncate(bbox.ymin))?;
        writeln!(xml, "      <xmax>{}</xmax>", truncate(bbox.xmax))?;
        writeln!(xml, "      <ymax>{}</ymax>", truncate(bbox.ymax))?;
        writeln!(xml, "    </bndbox>")?;
        writeln!(xml, "  </object>")?;
    }

    writeln!(xml, "</annotation>")
}

// `as` saturates on overflow and maps NaN to 0.
fn truncate(value: f64) -> i64 {
    value.trunc() as i64
}

fn folder_name(image_path: &Path) -> String {
    image_path
        .parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_FOLDER.to_string())
}

fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>, UnilabelError> {
    child_element(node, tag).ok_or_else(|| UnilabelError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!("missing <{tag}> in {context}"),
    })
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String, UnilabelError> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| UnilabelError::VocXmlParse {
            path: path.to_path_buf(),
            message: format!("missing <{tag}> in {context}"),
        })
}

fn parse_required_u32(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<u32, UnilabelError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<u32>().map_err(|_| UnilabelError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!("invalid <{tag}> value '{raw}' in {context}; expected u32"),
    })
}

fn parse_required_f64(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<f64, UnilabelError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| UnilabelError::VocXmlParse {
            path: path.to_path_buf(),
            message: format!(
                "invalid <{tag}> value '{raw}' in {context}; expected finite floating-point number"
            ),
        })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
