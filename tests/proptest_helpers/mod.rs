#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};
use unilabel::ir::{BBox, ImageRecord};

pub const EPS_COCO: f64 = 1e-10;
pub const EPS_VOC: f64 = 1e-9;
pub const EPS_LABELME: f64 = 1e-10;

/// Six decimal digits on normalized values, scaled back to pixels.
pub fn eps_yolo(image_w: u32, image_h: u32) -> f64 {
    image_w.max(image_h) as f64 * 1e-6
}

pub fn eps_yolo_for_records(records: &[ImageRecord]) -> f64 {
    records
        .iter()
        .map(|record| eps_yolo(record.width, record.height))
        .fold(1e-9, f64::max)
}

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoxSem {
    pub image_file: String,
    pub label: String,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

/// Flattens records into boxes keyed by image file name, sorted.
pub fn box_semantics(records: &[ImageRecord]) -> Vec<BoxSem> {
    let mut out: Vec<BoxSem> = records
        .iter()
        .flat_map(|record| {
            record.bboxes.iter().map(move |bbox| BoxSem {
                image_file: record.filename.clone(),
                label: bbox.label.clone(),
                xmin: bbox.xmin,
                ymin: bbox.ymin,
                xmax: bbox.xmax,
                ymax: bbox.ymax,
            })
        })
        .collect();
    out.sort_by(box_sem_cmp);
    out
}

pub fn assert_boxes_equivalent(
    a: &[ImageRecord],
    b: &[ImageRecord],
    eps: f64,
) -> Result<(), String> {
    let left = box_semantics(a);
    let right = box_semantics(b);

    if left.len() != right.len() {
        return Err(format!(
            "box count mismatch: left={} right={}",
            left.len(),
            right.len()
        ));
    }

    assert_semantics_subset(&left, &right, eps)?;
    assert_semantics_subset(&right, &left, eps)?;
    Ok(())
}

fn assert_semantics_subset(sub: &[BoxSem], sup: &[BoxSem], eps: f64) -> Result<(), String> {
    let mut used = vec![false; sup.len()];

    for wanted in sub {
        let found = sup
            .iter()
            .enumerate()
            .position(|(idx, candidate)| !used[idx] && approx_box_sem(wanted, candidate, eps));

        match found {
            Some(idx) => used[idx] = true,
            None => return Err(format!("no match for {wanted:?} (eps={eps})")),
        }
    }

    Ok(())
}

/// Image sizes by file name, for checks that ignore box order.
pub fn image_dims_by_file_name(records: &[ImageRecord]) -> Vec<(String, u32, u32)> {
    let mut dims: Vec<_> = records
        .iter()
        .map(|record| (record.filename.clone(), record.width, record.height))
        .collect();
    dims.sort();
    dims
}

/// A box with integer corners strictly inside a `width` x `height` image.
pub fn arb_bbox_within(width: u32, height: u32) -> BoxedStrategy<BBox> {
    (label_strategy(), any::<u32>())
        .prop_map(move |(label, seed)| {
            bbox_from_seed(
                label,
                width,
                height,
                (
                    seed,
                    seed.rotate_left(3),
                    seed.rotate_left(7),
                    seed.rotate_left(11),
                ),
            )
        })
        .boxed()
}

/// Records with unique file names (sorted), sizes in `2..=4096` and integer
/// boxes drawn from up to `max_labels` distinct labels.
pub fn arb_records(
    max_images: usize,
    max_labels: usize,
    max_boxes: usize,
) -> BoxedStrategy<Vec<ImageRecord>> {
    assert!(max_images > 0, "max_images must be > 0");
    assert!(max_labels > 0, "max_labels must be > 0");

    (1usize..=max_images, 1usize..=max_labels, 0usize..=max_boxes)
        .prop_flat_map(|(image_count, label_count, box_count)| {
            (
                proptest::collection::hash_map(
                    image_file_name_strategy(),
                    (2u32..=4096, 2u32..=4096),
                    image_count..=image_count,
                ),
                proptest::collection::hash_set(label_strategy(), label_count..=label_count),
                proptest::collection::vec(box_seed_strategy(), box_count..=box_count),
            )
                .prop_map(|(images, labels, seeds)| build_records(images, labels, seeds))
        })
        .boxed()
}

type BoxSeed = (u16, u16, (u32, u32, u32, u32));

fn box_seed_strategy() -> impl Strategy<Value = BoxSeed> {
    (
        any::<u16>(),
        any::<u16>(),
        (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()),
    )
}

fn image_file_name_strategy() -> BoxedStrategy<String> {
    proptest::string::string_regex("[a-z0-9_]{1,12}\\.jpg")
        .expect("valid filename regex")
        .boxed()
}

fn label_strategy() -> BoxedStrategy<String> {
    proptest::string::string_regex("[a-z]{1,20}")
        .expect("valid label regex")
        .boxed()
}

fn build_records(
    images: HashMap<String, (u32, u32)>,
    labels: HashSet<String>,
    seeds: Vec<BoxSeed>,
) -> Vec<ImageRecord> {
    let mut image_rows: Vec<(String, (u32, u32))> = images.into_iter().collect();
    image_rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut labels: Vec<String> = labels.into_iter().collect();
    labels.sort();

    let mut records: Vec<ImageRecord> = image_rows
        .into_iter()
        .map(|(file_name, (width, height))| {
            ImageRecord::new(file_name.clone(), file_name, width, height)
        })
        .collect();

    for (image_seed, label_seed, corners) in seeds {
        let image_idx = image_seed as usize % records.len();
        let label = labels[label_seed as usize % labels.len()].clone();
        let record = &mut records[image_idx];
        let bbox = bbox_from_seed(label, record.width, record.height, corners);
        record.bboxes.push(bbox);
    }

    records
}

fn bbox_from_seed(
    label: String,
    width: u32,
    height: u32,
    (sx, sy, sw, sh): (u32, u32, u32, u32),
) -> BBox {
    let xmin = sx % (width - 1);
    let ymin = sy % (height - 1);
    let xmax = xmin + 1 + (sw % (width - xmin));
    let ymax = ymin + 1 + (sh % (height - ymin));

    BBox::new(label, xmin as f64, ymin as f64, xmax as f64, ymax as f64)
}

fn approx_box_sem(left: &BoxSem, right: &BoxSem, eps: f64) -> bool {
    left.image_file == right.image_file
        && left.label == right.label
        && (left.xmin - right.xmin).abs() <= eps
        && (left.ymin - right.ymin).abs() <= eps
        && (left.xmax - right.xmax).abs() <= eps
        && (left.ymax - right.ymax).abs() <= eps
}

fn box_sem_cmp(a: &BoxSem, b: &BoxSem) -> std::cmp::Ordering {
    a.image_file
        .cmp(&b.image_file)
        .then_with(|| a.label.cmp(&b.label))
        .then_with(|| a.xmin.total_cmp(&b.xmin))
        .then_with(|| a.ymin.total_cmp(&b.ymin))
        .then_with(|| a.xmax.total_cmp(&b.xmax))
        .then_with(|| a.ymax.total_cmp(&b.ymax))
}
