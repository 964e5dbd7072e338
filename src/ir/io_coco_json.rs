//! COCO JSON format reader and writer.
//!
//! COCO keeps every image of a dataset in one JSON file with global
//! `images`, `annotations` and `categories` tables, so unlike the per-image
//! formats this module reads and writes whole batches.
//!
//! # COCO Format Reference
//!
//! COCO bounding boxes use `[x, y, width, height]` format where:
//! - `(x, y)` is the top-left corner in absolute pixel coordinates
//! - `width` and `height` are the dimensions
//!
//! This differs from our canonical IR format which uses XYXY (xmin, ymin, xmax, ymax).
//!
//! # Deterministic Output
//!
//! Category ids come from the sorted label set (starting at 1), image ids
//! follow record order (starting at 1) and annotation ids count up across
//! the whole batch (starting at 1). Exporting the same records twice gives
//! byte-identical files.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BBox, ClassList, ImageRecord};
use crate::error::UnilabelError;

/// Label given to annotations whose `category_id` is not in `categories`.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Default file name used when exporting COCO into a directory.
pub const DEFAULT_COCO_FILE_NAME: &str = "instances_converted.json";

// ============================================================================
// COCO Schema Types (internal to this module)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CocoDatasetIn {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotationIn>,
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoImage {
    id: u64,
    file_name: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,
}

/// Annotation as read. Segmentation, area and crowd flags are accepted but
/// ignored for detection.
#[derive(Debug, Deserialize)]
struct CocoAnnotationIn {
    image_id: u64,
    category_id: u64,

    /// COCO bbox format: [x, y, width, height] with (x,y) as top-left corner
    bbox: [f64; 4],
}

#[derive(Debug, Serialize)]
struct CocoDatasetOut {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotationOut>,
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Serialize)]
struct CocoAnnotationOut {
    id: u64,
    image_id: u64,
    category_id: u64,
    bbox: [f64; 4],
    area: f64,
    iscrowd: u8,
}

// ============================================================================
// Public API
// ============================================================================

/// Records read from a COCO file, plus what was dropped on the way.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CocoImport {
    /// One record per entry of `images`, in file order.
    pub records: Vec<ImageRecord>,
    /// Annotations whose `image_id` is not in `images`.
    pub dropped_annotations: usize,
    /// Annotations whose `category_id` is not in `categories` (kept, labelled
    /// [`UNKNOWN_CATEGORY`]).
    pub unknown_categories: usize,
}

/// Reads a COCO JSON file.
///
/// Image paths are resolved as `image_root/file_name`.
///
/// # Errors
/// Returns an error if the file cannot be read or lacks the
/// `images`/`annotations`/`categories` tables.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use unilabel::ir::io_coco_json::read_coco_json;
///
/// let import = read_coco_json(Path::new("annotations.json"), Path::new("images"))?;
/// println!("{} images", import.records.len());
/// # Ok::<(), unilabel::UnilabelError>(())
/// ```
pub fn read_coco_json(path: &Path, image_root: &Path) -> Result<CocoImport, UnilabelError> {
    let file = File::open(path).map_err(|source| UnilabelError::io_at(path, source))?;
    let reader = BufReader::new(file);

    let coco: CocoDatasetIn =
        serde_json::from_reader(reader).map_err(|source| UnilabelError::CocoJsonParse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(coco_to_ir(coco, image_root))
}

/// Reads COCO from a JSON string.
///
/// Useful for testing without file I/O.
pub fn from_coco_str(json: &str, image_root: &Path) -> Result<CocoImport, serde_json::Error> {
    let coco: CocoDatasetIn = serde_json::from_str(json)?;
    Ok(coco_to_ir(coco, image_root))
}

/// Reads COCO from a JSON byte slice.
///
/// Useful for fuzzing and processing raw bytes without UTF-8 validation overhead.
pub fn from_coco_slice(bytes: &[u8], image_root: &Path) -> Result<CocoImport, serde_json::Error> {
    let coco: CocoDatasetIn = serde_json::from_slice(bytes)?;
    Ok(coco_to_ir(coco, image_root))
}

/// Writes all records to one COCO JSON file.
///
/// Creates the parent directory if needed.
pub fn write_coco_json(path: &Path, records: &[ImageRecord]) -> Result<(), UnilabelError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| UnilabelError::io_at(parent, source))?;
    }

    let file = File::create(path).map_err(|source| UnilabelError::io_at(path, source))?;
    let writer = BufWriter::new(file);

    let coco = ir_to_coco(records);

    serde_json::to_writer_pretty(writer, &coco).map_err(|source| UnilabelError::CocoJsonWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes all records to a COCO JSON string.
///
/// Useful for testing without file I/O.
pub fn to_coco_string(records: &[ImageRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ir_to_coco(records))
}

// ============================================================================
// Conversion: COCO -> IR
// ============================================================================

fn coco_to_ir(coco: CocoDatasetIn, image_root: &Path) -> CocoImport {
    let category_names: HashMap<u64, String> = coco
        .categories
        .into_iter()
        .map(|cat| (cat.id, cat.name))
        .collect();

    // A repeated image id replaces the earlier entry but keeps its position.
    let mut records: Vec<ImageRecord> = Vec::with_capacity(coco.images.len());
    let mut position_by_id: HashMap<u64, usize> = HashMap::with_capacity(coco.images.len());
    for img in coco.images {
        let record = ImageRecord::new(
            img.file_name.clone(),
            image_root.join(&img.file_name),
            img.width,
            img.height,
        );
        match position_by_id.get(&img.id) {
            Some(&position) => records[position] = record,
            None => {
                position_by_id.insert(img.id, records.len());
                records.push(record);
            }
        }
    }

    let mut import = CocoImport::default();
    for ann in coco.annotations {
        let Some(&position) = position_by_id.get(&ann.image_id) else {
            import.dropped_annotations += 1;
            continue;
        };

        let label = match category_names.get(&ann.category_id) {
            Some(name) => name.clone(),
            None => {
                import.unknown_categories += 1;
                UNKNOWN_CATEGORY.to_string()
            }
        };

        let [x, y, w, h] = ann.bbox;
        records[position]
            .bboxes
            .push(BBox::from_xywh(label, x, y, w, h));
    }

    if import.dropped_annotations > 0 {
        debug!(
            dropped = import.dropped_annotations,
            "dropped COCO annotations referencing unknown images"
        );
    }

    import.records = records;
    import
}

// ============================================================================
// Conversion: IR -> COCO
// ============================================================================

fn ir_to_coco(records: &[ImageRecord]) -> CocoDatasetOut {
    let classes = ClassList::derive(records);
    let category_ids: BTreeMap<&str, u64> = classes
        .names()
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), (idx + 1) as u64))
        .collect();

    let categories = category_ids
        .iter()
        .map(|(name, id)| CocoCategory {
            id: *id,
            name: (*name).to_string(),
        })
        .collect();

    let mut images = Vec::with_capacity(records.len());
    let mut annotations = Vec::new();
    let mut next_annotation_id: u64 = 1;

    for (index, record) in records.iter().enumerate() {
        let image_id = (index + 1) as u64;
        images.push(CocoImage {
            id: image_id,
            file_name: record.filename.clone(),
            width: record.width,
            height: record.height,
        });

        for bbox in &record.bboxes {
            // Every label is in the derived list, so the lookup cannot miss.
            let Some(&category_id) = category_ids.get(bbox.label.as_str()) else {
                continue;
            };
            let (x, y, w, h) = bbox.to_xywh();
            annotations.push(CocoAnnotationOut {
                id: next_annotation_id,
                image_id,
                category_id,
                bbox: [x, y, w, h],
                area: bbox.area(),
                iscrowd: 0,
            });
            next_annotation_id += 1;
        }
    }

    CocoDatasetOut {
        images,
        annotations,
        categories,
    }
}

// ============================================================================
// Tests
// ============================================================================
