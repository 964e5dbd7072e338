//! Core image model for the unilabel intermediate representation.
//!
//! All format-specific readers produce [`ImageRecord`] values, and all
//! writers consume them. Records are independent of each other: nothing in
//! one record refers to another.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::bbox::BBox;

/// One annotated image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Base file name of the image (e.g. `"123.jpg"`); its stem names the
    /// annotation files written on export.
    pub filename: String,

    /// Resolved path to the pixel data.
    pub image_path: PathBuf,

    /// Width of the image in pixels.
    pub width: u32,

    /// Height of the image in pixels.
    pub height: u32,

    /// Boxes in insertion order.
    #[serde(default)]
    pub bboxes: Vec<BBox>,
}

impl ImageRecord {
    /// Creates a record without any boxes.
    pub fn new(
        filename: impl Into<String>,
        image_path: impl Into<PathBuf>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            filename: filename.into(),
            image_path: image_path.into(),
            width,
            height,
            bboxes: Vec::new(),
        }
    }

    /// Appends a box to this record.
    pub fn with_bbox(mut self, bbox: BBox) -> Self {
        self.bboxes.push(bbox);
        self
    }

    /// File stem of `filename`, used to name sibling annotation files.
    pub fn stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.filename)
    }

    /// Annotation file name for this record with the given extension.
    pub fn annotation_file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.stem(), extension)
    }

    /// Distinct labels used by this record.
    pub fn labels(&self) -> BTreeSet<&str> {
        self.bboxes.iter().map(|bbox| bbox.label.as_str()).collect()
    }
}
