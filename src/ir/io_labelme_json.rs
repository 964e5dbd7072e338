//! LabelMe JSON reader and writer.
//!
//! LabelMe writes one JSON file per image, next to the image, with a list of
//! labelled shapes. Shapes may be polygons; they are reduced to their
//! axis-aligned bounding box on import, and boxes are written back as
//! two-point `rectangle` shapes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::io_yolo::read_image_dimensions;
use super::{file_name_string, find_sibling_image, BBox, ImageRecord};
use crate::error::UnilabelError;

pub const LABELME_EXTENSION: &str = "json";

/// Value written to the `version` field.
pub const LABELME_VERSION: &str = "5.5.0";

const FALLBACK_IMAGE_EXTENSION: &str = "jpg";

// ============================================================================
// LabelMe schema types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelMeFileIn {
    #[serde(default)]
    shapes: Vec<LabelMeShapeIn>,
    #[serde(default)]
    image_path: Option<String>,
    #[serde(default)]
    image_height: Option<u32>,
    #[serde(default)]
    image_width: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LabelMeShapeIn {
    label: String,
    points: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelMeFileOut<'a> {
    version: &'static str,
    flags: BTreeMap<String, bool>,
    shapes: Vec<LabelMeShapeOut<'a>>,
    image_path: &'a str,
    /// Always null: LabelMe then loads the image file next to the JSON.
    image_data: Option<String>,
    image_height: u32,
    image_width: u32,
}

#[derive(Debug, Serialize)]
struct LabelMeShapeOut<'a> {
    label: &'a str,
    points: [[f64; 2]; 2],
    group_id: Option<i64>,
    description: &'static str,
    shape_type: &'static str,
    flags: BTreeMap<String, bool>,
    mask: Option<String>,
}

// ============================================================================
// Public API
// ============================================================================

/// Reads one LabelMe JSON file into an IR record.
///
/// The image file name is resolved by probing for a sibling image with the
/// JSON's stem; if none exists, the base name of `imagePath` is used.
pub fn read_labelme_json(path: &Path) -> Result<ImageRecord, UnilabelError> {
    let json = fs::read_to_string(path).map_err(|source| UnilabelError::io_at(path, source))?;
    from_labelme_str(&json, path)
}

/// Parses LabelMe JSON from a string.
///
/// `path` is where the JSON lives; image resolution is relative to it.
pub fn from_labelme_str(json: &str, path: &Path) -> Result<ImageRecord, UnilabelError> {
    let parsed: LabelMeFileIn =
        serde_json::from_str(json).map_err(|source| UnilabelError::LabelMeJsonParse {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?;

    let filename = resolve_image_file_name(path, parsed.image_path.as_deref());
    let image_path = path
        .parent()
        .map(|dir| dir.join(&filename))
        .unwrap_or_else(|| PathBuf::from(&filename));

    let (width, height) = match (parsed.image_width, parsed.image_height) {
        (Some(width), Some(height)) => (width, height),
        _ if image_path.is_file() => read_image_dimensions(&image_path)?,
        _ => {
            return Err(UnilabelError::LabelMeJsonParse {
                path: path.to_path_buf(),
                message: "missing imageWidth/imageHeight and no image file to read them from"
                    .to_string(),
            })
        }
    };

    let mut record = ImageRecord::new(filename, image_path, width, height);
    for (idx, shape) in parsed.shapes.into_iter().enumerate() {
        let bbox = BBox::from_points(shape.label, &shape.points).ok_or_else(|| {
            UnilabelError::LabelMeJsonParse {
                path: path.to_path_buf(),
                message: format!("shape {idx} has no points"),
            }
        })?;
        record.bboxes.push(bbox);
    }

    Ok(record)
}

/// Writes one record as `<stem>.json` inside `output_dir`.
///
/// Creates `output_dir` if needed and returns the path written.
pub fn write_labelme_json(
    record: &ImageRecord,
    output_dir: &Path,
) -> Result<PathBuf, UnilabelError> {
    fs::create_dir_all(output_dir).map_err(|source| UnilabelError::io_at(output_dir, source))?;

    let json_path = output_dir.join(record.annotation_file_name(LABELME_EXTENSION));
    let json = to_labelme_string(record).map_err(|source| UnilabelError::LabelMeJsonWrite {
        path: json_path.clone(),
        source,
    })?;
    fs::write(&json_path, json).map_err(|source| UnilabelError::io_at(&json_path, source))?;
    Ok(json_path)
}

/// Renders one record as LabelMe JSON (two-space indentation).
pub fn to_labelme_string(record: &ImageRecord) -> Result<String, serde_json::Error> {
    let shapes = record
        .bboxes
        .iter()
        .map(|bbox| LabelMeShapeOut {
            label: &bbox.label,
            points: [[bbox.xmin, bbox.ymin], [bbox.xmax, bbox.ymax]],
            group_id: None,
            description: "",
            shape_type: "rectangle",
            flags: BTreeMap::new(),
            mask: None,
        })
        .collect();

    let file = LabelMeFileOut {
        version: LABELME_VERSION,
        flags: BTreeMap::new(),
        shapes,
        image_path: &record.filename,
        image_data: None,
        image_height: record.height,
        image_width: record.width,
    };

    serde_json::to_string_pretty(&file)
}

fn resolve_image_file_name(json_path: &Path, image_path_field: Option<&str>) -> String {
    if let Some(sibling) = find_sibling_image(json_path) {
        return file_name_string(&sibling);
    }

    // `imagePath` is often written on Windows, so split on both separators.
    let from_field = image_path_field
        .and_then(|raw| raw.rsplit(['/', '\\']).next())
        .filter(|name| !name.is_empty());

    match from_field {
        Some(name) => name.to_string(),
        None => file_name_string(&json_path.with_extension(FALLBACK_IMAGE_EXTENSION)),
    }
}
