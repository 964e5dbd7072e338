use std::collections::BTreeSet;
use std::path::Path;

use proptest::prelude::*;
use unilabel::ir::io_coco_json::{from_coco_str, to_coco_string};

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn coco_roundtrip_preserves_boxes(records in proptest_helpers::arb_records(5, 5, 20)) {
        let json = to_coco_string(&records).expect("serialize coco");
        let import = from_coco_str(&json, Path::new("")).expect("parse coco");

        prop_assert_eq!(import.dropped_annotations, 0);
        prop_assert_eq!(import.unknown_categories, 0);
        prop_assert_eq!(
            proptest_helpers::image_dims_by_file_name(&records),
            proptest_helpers::image_dims_by_file_name(&import.records)
        );

        let res = proptest_helpers::assert_boxes_equivalent(
            &records,
            &import.records,
            proptest_helpers::EPS_COCO,
        );
        prop_assert!(res.is_ok(), "{}", res.unwrap_err());
    }

    #[test]
    fn coco_output_is_deterministic(records in proptest_helpers::arb_records(5, 5, 20)) {
        let first = to_coco_string(&records).expect("serialize first");
        let second = to_coco_string(&records).expect("serialize second");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn coco_ids_are_sequential(records in proptest_helpers::arb_records(5, 5, 20)) {
        let json = to_coco_string(&records).expect("serialize coco");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse json");

        let ids = |table: &str| -> Vec<u64> {
            value[table]
                .as_array()
                .expect("table is an array")
                .iter()
                .map(|row| row["id"].as_u64().expect("numeric id"))
                .collect()
        };

        let box_count: usize = records.iter().map(|r| r.bboxes.len()).sum();
        prop_assert_eq!(ids("images"), (1..=records.len() as u64).collect::<Vec<_>>());
        prop_assert_eq!(ids("annotations"), (1..=box_count as u64).collect::<Vec<_>>());

        let labels: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.bboxes.iter().map(|b| b.label.as_str()))
            .collect();
        let names: Vec<&str> = value["categories"]
            .as_array()
            .expect("categories array")
            .iter()
            .map(|cat| cat["name"].as_str().expect("category name"))
            .collect();
        prop_assert_eq!(names, labels.into_iter().collect::<Vec<_>>());
    }
}
