//! Labelled bounding boxes in absolute pixel space, plus the YOLO
//! normalized form they convert to at the format boundary.

use serde::{Deserialize, Serialize};

/// One object instance: a class label and an axis-aligned box in absolute
/// pixel coordinates of the original image (XYXY).
///
/// Note: This type does NOT enforce that min < max. Degenerate boxes can be
/// represented so that importers stay permissive and callers decide what to
/// do with them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// Category name (never an index).
    pub label: String,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

/// A box in YOLO form: center and size as fractions of the image size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloBox {
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    /// Creates a new box from explicit XYXY coordinates.
    pub fn new(label: impl Into<String>, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            label: label.into(),
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Converts from XYWH format (x, y, width, height) where (x, y) is the top-left corner.
    ///
    /// This is the format used by COCO annotations.
    pub fn from_xywh(label: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(label, x, y, x + width, y + height)
    }

    /// Reduces a polygon (or any point set) to its axis-aligned bounding box.
    ///
    /// Returns `None` for an empty point set.
    pub fn from_points(label: impl Into<String>, points: &[[f64; 2]]) -> Option<Self> {
        let first = points.first()?;
        let (mut xmin, mut ymin, mut xmax, mut ymax) = (first[0], first[1], first[0], first[1]);
        for [x, y] in &points[1..] {
            xmin = xmin.min(*x);
            ymin = ymin.min(*y);
            xmax = xmax.max(*x);
            ymax = ymax.max(*y);
        }
        Some(Self::new(label, xmin, ymin, xmax, ymax))
    }

    /// De-normalizes a YOLO box against the given image size.
    pub fn from_yolo(label: impl Into<String>, yolo: &YoloBox, image_width: u32, image_height: u32) -> Self {
        let (w, h) = (image_width as f64, image_height as f64);
        Self::new(
            label,
            (yolo.cx - yolo.w / 2.0) * w,
            (yolo.cy - yolo.h / 2.0) * h,
            (yolo.cx + yolo.w / 2.0) * w,
            (yolo.cy + yolo.h / 2.0) * h,
        )
    }

    /// Returns the width of the box.
    ///
    /// May be negative if the box is malformed (xmax < xmin).
    #[inline]
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Returns the height of the box.
    ///
    /// May be negative if the box is malformed (ymax < ymin).
    #[inline]
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns true if all coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.xmin.is_finite() && self.ymin.is_finite() && self.xmax.is_finite() && self.ymax.is_finite()
    }

    /// Returns true if the box has strictly positive extent on both axes.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.xmin < self.xmax && self.ymin < self.ymax
    }

    /// Converts to XYWH format (x, y, width, height).
    #[inline]
    pub fn to_xywh(&self) -> (f64, f64, f64, f64) {
        (self.xmin, self.ymin, self.width(), self.height())
    }

    /// Normalizes this box against an image of the given size.
    ///
    /// Returns `None` when either image dimension is zero, instead of
    /// producing infinite or NaN values.
    pub fn to_yolo(&self, image_width: u32, image_height: u32) -> Option<YoloBox> {
        if image_width == 0 || image_height == 0 {
            return None;
        }

        let (w, h) = (image_width as f64, image_height as f64);
        Some(YoloBox {
            cx: (self.xmin + self.xmax) / 2.0 / w,
            cy: (self.ymin + self.ymax) / 2.0 / h,
            w: self.width() / w,
            h: self.height() / h,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(left: f64, right: f64) {
        assert!((left - right).abs() < 1e-9, "{left} != {right}");
    }

    #[test]
    fn test_bbox_dimensions() {
        let bbox = BBox::new("cat", 10.0, 20.0, 100.0, 80.0);
        assert_eq!(bbox.width(), 90.0);
        assert_eq!(bbox.height(), 60.0);
        assert_eq!(bbox.area(), 5400.0);
    }

    #[test]
    fn test_bbox_from_xywh() {
        let bbox = BBox::from_xywh("dog", 5.0, 5.0, 10.0, 10.0);
        assert_eq!(bbox, BBox::new("dog", 5.0, 5.0, 15.0, 15.0));
        assert_eq!(bbox.to_xywh(), (5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn test_bbox_ordering() {
        assert!(BBox::new("a", 10.0, 20.0, 100.0, 80.0).is_ordered());
        assert!(!BBox::new("a", 100.0, 80.0, 10.0, 20.0).is_ordered());
        assert!(!BBox::new("a", 10.0, 10.0, 10.0, 20.0).is_ordered());
    }

    #[test]
    fn test_from_points_reduces_polygon() {
        let points = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        let bbox = BBox::from_points("poly", &points).expect("non-empty points");
        assert_eq!(bbox, BBox::new("poly", 0.0, 0.0, 10.0, 10.0));

        assert!(BBox::from_points("empty", &[]).is_none());
    }

    #[test]
    fn test_from_points_handles_reversed_rectangle() {
        let bbox = BBox::from_points("r", &[[30.0, 40.0], [5.0, 2.0]]).expect("points");
        assert_eq!(bbox, BBox::new("r", 5.0, 2.0, 30.0, 40.0));
    }

    #[test]
    fn test_to_yolo_matches_reference_values() {
        let bbox = BBox::new("cat", 10.0, 20.0, 50.0, 80.0);
        let yolo = bbox.to_yolo(100, 200).expect("valid size");
        assert_close(yolo.cx, 0.3);
        assert_close(yolo.cy, 0.25);
        assert_close(yolo.w, 0.4);
        assert_close(yolo.h, 0.3);
    }

    #[test]
    fn test_yolo_roundtrip_recovers_box() {
        let bbox = BBox::new("cat", 12.5, 7.25, 301.0, 199.5);
        let yolo = bbox.to_yolo(640, 480).expect("valid size");
        let restored = BBox::from_yolo("cat", &yolo, 640, 480);
        assert_close(restored.xmin, bbox.xmin);
        assert_close(restored.ymin, bbox.ymin);
        assert_close(restored.xmax, bbox.xmax);
        assert_close(restored.ymax, bbox.ymax);
    }

    #[test]
    fn test_to_yolo_rejects_zero_dimensions() {
        let bbox = BBox::new("cat", 1.0, 1.0, 2.0, 2.0);
        assert_eq!(bbox.to_yolo(0, 100), None);
        assert_eq!(bbox.to_yolo(100, 0), None);
    }
}
