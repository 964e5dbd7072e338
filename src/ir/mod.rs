//! Intermediate Representation (IR) for unilabel.
//!
//! Every format is read into a list of [`ImageRecord`] values and written
//! back out from one; readers and writers never talk to each other. This is
//! what lets any of the 4×4 format pairs work with only one reader and one
//! writer per format.
//!
//! # Design Principles
//!
//! 1. **Labels, not indices**: boxes carry their class name as a string.
//!    Class indices exist only at the YOLO and COCO boundaries.
//!
//! 2. **Canonical geometry**: boxes are XYXY in absolute pixels of the
//!    original image. Normalization and polygon reduction happen in the
//!    format modules only.
//!
//! 3. **Permissive construction**: degenerate boxes can be represented, so
//!    readers report what a file says instead of rejecting it.
//!
//! # Example
//!
//! ```
//! use unilabel::ir::{BBox, ImageRecord};
//!
//! let record = ImageRecord::new("image.jpg", "data/image.jpg", 640, 480)
//!     .with_bbox(BBox::new("person", 10.0, 20.0, 100.0, 200.0));
//! assert_eq!(record.bboxes[0].width(), 90.0);
//! ```

mod bbox;
mod classes;
pub mod io_coco_json;
pub mod io_labelme_json;
pub mod io_voc_xml;
pub mod io_yolo;
mod model;

pub use bbox::{BBox, YoloBox};
pub use classes::{is_storable_class_name, parse_classes_txt, ClassList, CLASSES_TXT};
pub use model::ImageRecord;

use std::path::{Path, PathBuf};

/// Image extensions probed, in order, when pairing an annotation with its image.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "png", "jpeg", "bmp"];

/// Finds an existing image next to `annotation_path` with the same stem.
///
/// Extensions are tried in [`IMAGE_EXTENSIONS`] order; the first hit wins.
pub fn find_sibling_image(annotation_path: &Path) -> Option<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| annotation_path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Base name of a path as a string, or an empty string if it has none.
pub(crate) fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
