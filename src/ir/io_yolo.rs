//! YOLO label reader and writer.
//!
//! A YOLO directory holds one `.txt` file per image next to the image itself,
//! plus a shared `classes.txt`. Each label line is
//! `class_id cx cy w h` with coordinates normalized to the image size. The
//! canonical IR representation remains pixel-space XYXY boxes, so image
//! dimensions have to be read from the paired image file.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{file_name_string, BBox, ClassList, ImageRecord, YoloBox};
use crate::error::UnilabelError;

pub const LABEL_EXTENSION: &str = "txt";

/// Reads one YOLO label file into an IR record.
///
/// `image_path` is the paired image; its header supplies the pixel size used
/// to de-normalize coordinates. Class ids index into `classes`; ids outside
/// the list become their numeric string as the label.
pub fn read_yolo_txt(
    txt_path: &Path,
    image_path: &Path,
    classes: &ClassList,
) -> Result<ImageRecord, UnilabelError> {
    let (width, height) = read_image_dimensions(image_path)?;
    let content =
        fs::read_to_string(txt_path).map_err(|source| UnilabelError::io_at(txt_path, source))?;

    let mut record = ImageRecord::new(file_name_string(image_path), image_path, width, height);
    record.bboxes = parse_yolo_labels(&content, txt_path, width, height, classes)?;
    Ok(record)
}

/// Parses the content of a YOLO label file into pixel-space boxes.
///
/// Blank lines and lines with fewer than five tokens are skipped. Tokens
/// after the fifth are ignored. A token that is present but not a number
/// fails the whole file.
pub fn parse_yolo_labels(
    content: &str,
    path: &Path,
    image_width: u32,
    image_height: u32,
    classes: &ClassList,
) -> Result<Vec<BBox>, UnilabelError> {
    let mut bboxes = Vec::new();
    for (line_idx, line) in content.lines().enumerate() {
        let Some(row) = parse_label_line(line, path, line_idx + 1)? else {
            continue;
        };

        let label = classes
            .name(row.class_id)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| row.class_id.to_string());

        bboxes.push(BBox::from_yolo(label, &row.bbox, image_width, image_height));
    }
    Ok(bboxes)
}

/// Result of rendering one record as YOLO label lines.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct YoloLabels {
    pub text: String,
    /// Boxes written.
    pub written: usize,
    /// Boxes dropped because their label is not in the class list.
    pub dropped: usize,
}

/// Renders one record as YOLO label lines (6 decimal digits).
///
/// Boxes whose label is absent from `classes` are dropped and counted.
///
/// # Errors
/// Returns [`UnilabelError::InvalidGeometry`] if a box has to be normalized
/// against a zero image width or height.
pub fn to_yolo_string(
    record: &ImageRecord,
    classes: &ClassList,
) -> Result<YoloLabels, UnilabelError> {
    let mut labels = YoloLabels::default();

    for bbox in &record.bboxes {
        let Some(class_id) = classes.index_of(&bbox.label) else {
            labels.dropped += 1;
            continue;
        };

        let yolo = bbox
            .to_yolo(record.width, record.height)
            .ok_or_else(|| UnilabelError::InvalidGeometry {
                filename: record.filename.clone(),
                width: record.width,
                height: record.height,
            })?;

        // Writing into a String cannot fail.
        let _ = writeln!(
            labels.text,
            "{} {:.6} {:.6} {:.6} {:.6}",
            class_id, yolo.cx, yolo.cy, yolo.w, yolo.h
        );
        labels.written += 1;
    }

    Ok(labels)
}

/// Writes one record as `<stem>.txt` inside `output_dir`.
///
/// The file is written even when no box survives, so every image keeps a
/// label file. Returns the path written and the box counts.
pub fn write_yolo_txt(
    record: &ImageRecord,
    output_dir: &Path,
    classes: &ClassList,
) -> Result<(PathBuf, YoloLabels), UnilabelError> {
    let labels = to_yolo_string(record, classes)?;

    fs::create_dir_all(output_dir).map_err(|source| UnilabelError::io_at(output_dir, source))?;
    let label_path = output_dir.join(record.annotation_file_name(LABEL_EXTENSION));
    fs::write(&label_path, &labels.text)
        .map_err(|source| UnilabelError::io_at(&label_path, source))?;

    Ok((label_path, labels))
}

/// Reads `(width, height)` from an image header without decoding pixels.
pub fn read_image_dimensions(path: &Path) -> Result<(u32, u32), UnilabelError> {
    let size = imagesize::size(path).map_err(|source| UnilabelError::ImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;

    let width: u32 = size
        .width
        .try_into()
        .map_err(|_| UnilabelError::ImageDimensionInvalid {
            path: path.to_path_buf(),
            message: format!("image width {} does not fit in u32", size.width),
        })?;

    let height: u32 = size
        .height
        .try_into()
        .map_err(|_| UnilabelError::ImageDimensionInvalid {
            path: path.to_path_buf(),
            message: format!("image height {} does not fit in u32", size.height),
        })?;

    Ok((width, height))
}

#[derive(Debug, PartialEq)]
struct YoloLabelRow {
    class_id: usize,
    bbox: YoloBox,
}

fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<YoloLabelRow>, UnilabelError> {
    // Take at most 5 tokens so pathological inputs do not allocate unbounded memory.
    let tokens: Vec<&str> = line.split_whitespace().take(5).collect();

    if tokens.is_empty() {
        return Ok(None);
    }

    if tokens.len() < 5 {
        debug!(
            path = %file_path.display(),
            line = line_num,
            "skipping YOLO line with {} token(s)",
            tokens.len()
        );
        return Ok(None);
    }

    let class_id = tokens[0]
        .parse::<usize>()
        .map_err(|_| UnilabelError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!(
                "invalid class_id '{}'; expected non-negative integer",
                tokens[0]
            ),
        })?;

    let cx = parse_f64_token(tokens[1], "x_center", file_path, line_num)?;
    let cy = parse_f64_token(tokens[2], "y_center", file_path, line_num)?;
    let w = parse_f64_token(tokens[3], "width", file_path, line_num)?;
    let h = parse_f64_token(tokens[4], "height", file_path, line_num)?;

    Ok(Some(YoloLabelRow {
        class_id,
        bbox: YoloBox { cx, cy, w, h },
    }))
}

/// Fuzz-only entrypoint for YOLO single-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) -> Result<(), UnilabelError> {
    let _ = parse_label_line(input, Path::new("<fuzz>"), 1)?;
    Ok(())
}

fn parse_f64_token(
    raw: &str,
    field_name: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<f64, UnilabelError> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| UnilabelError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!("invalid {field_name} '{raw}'; expected finite floating-point number"),
        })
}
