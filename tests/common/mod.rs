#![allow(dead_code)]

use std::fs;
use std::path::Path;

use unilabel::ir::{BBox, ImageRecord};

/// Minimal 24-bit BMP: a valid header plus zeroed pixels, enough for
/// `imagesize` to read the dimensions.
pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// Writes a YOLO directory: `classes.txt`, one BMP per image and one label
/// file per image. `images` is `(stem, width, height, label file content)`.
pub fn write_yolo_dir(dir: &Path, classes: &[&str], images: &[(&str, u32, u32, &str)]) {
    fs::create_dir_all(dir).expect("create yolo dir");
    let mut class_txt = classes.join("\n");
    class_txt.push('\n');
    fs::write(dir.join("classes.txt"), class_txt).expect("write classes.txt");

    for (stem, width, height, labels) in images {
        write_bmp(&dir.join(format!("{stem}.bmp")), *width, *height);
        fs::write(dir.join(format!("{stem}.txt")), labels).expect("write label file");
    }
}

/// A small two-image dataset whose images are BMP files inside `dir`, so
/// every format (YOLO included) can find them after export.
pub fn sample_records(dir: &Path) -> Vec<ImageRecord> {
    write_bmp(&dir.join("street.bmp"), 100, 200);
    write_bmp(&dir.join("park.bmp"), 64, 48);

    vec![
        ImageRecord::new("street.bmp", dir.join("street.bmp"), 100, 200)
            .with_bbox(BBox::new("cat", 10.0, 20.0, 50.0, 80.0))
            .with_bbox(BBox::new("dog", 0.0, 0.0, 100.0, 200.0)),
        ImageRecord::new("park.bmp", dir.join("park.bmp"), 64, 48)
            .with_bbox(BBox::new("cat", 4.0, 8.0, 12.0, 40.0)),
    ]
}

/// Boxes of a record list as `(filename, label, xmin, ymin, xmax, ymax)`,
/// sorted so order-insensitive comparisons are easy.
pub fn box_rows(records: &[ImageRecord]) -> Vec<(String, String, f64, f64, f64, f64)> {
    let mut rows: Vec<_> = records
        .iter()
        .flat_map(|record| {
            record.bboxes.iter().map(move |bbox| {
                (
                    record.filename.clone(),
                    bbox.label.clone(),
                    bbox.xmin,
                    bbox.ymin,
                    bbox.xmax,
                    bbox.ymax,
                )
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.total_cmp(&b.2))
            .then_with(|| a.3.total_cmp(&b.3))
    });
    rows
}

pub fn assert_boxes_close(
    left: &[(String, String, f64, f64, f64, f64)],
    right: &[(String, String, f64, f64, f64, f64)],
    eps: f64,
) {
    assert_eq!(left.len(), right.len(), "box count mismatch");
    for (l, r) in left.iter().zip(right) {
        assert_eq!((&l.0, &l.1), (&r.0, &r.1));
        for (a, b) in [(l.2, r.2), (l.3, r.3), (l.4, r.4), (l.5, r.5)] {
            assert!((a - b).abs() <= eps, "{l:?} vs {r:?} (eps {eps})");
        }
    }
}
