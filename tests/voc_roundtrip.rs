//! Integration tests for Pascal VOC format support.

use std::fs;
use std::path::Path;

use unilabel::conversion::{
    export_dataset, import_dataset, CancelFlag, ConversionIssueCode, ExportRequest, Format,
    ImportRequest,
};
use unilabel::ir::io_voc_xml::{read_voc_xml, write_voc_xml};
use unilabel::ir::{BBox, ImageRecord};

fn create_sample_voc_dir(root: &Path) {
    fs::create_dir_all(root).expect("create annotations dir");

    let xml_a = r#"<?xml version="1.0" encoding="utf-8"?>
<annotation>
  <filename>img_a.jpg</filename>
  <size>
    <width>100</width>
    <height>50</height>
    <depth>3</depth>
  </size>
  <object>
    <name>cat</name>
    <pose>Sitting</pose>
    <difficult>0</difficult>
    <bndbox>
      <xmin>1</xmin>
      <ymin>2</ymin>
      <xmax>30</xmax>
      <ymax>40</ymax>
    </bndbox>
  </object>
  <object>
    <name>dog</name>
    <truncated>yes</truncated>
    <bndbox>
      <xmin>31.5</xmin>
      <ymin>4</ymin>
      <xmax>80</xmax>
      <ymax>45</ymax>
    </bndbox>
  </object>
</annotation>
"#;

    let xml_b = r#"<annotation>
  <filename>img_b.jpg</filename>
  <size>
    <width>64</width>
    <height>64</height>
  </size>
</annotation>
"#;

    fs::write(root.join("img_a.xml"), xml_a).expect("write img_a.xml");
    fs::write(root.join("img_b.XML"), xml_b).expect("write img_b.XML");
    fs::write(root.join("readme.txt"), "not an annotation").expect("write readme");
}

#[test]
fn import_reads_every_xml_in_name_order() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_sample_voc_dir(temp.path());

    let outcome = import_dataset(
        &ImportRequest::new(Format::Voc, temp.path()),
        &CancelFlag::new(),
    )
    .expect("import voc");

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.report.import.items, 2);
    assert_eq!(outcome.report.import.failed, 0);

    let a = &outcome.records[0];
    assert_eq!(a.filename, "img_a.jpg");
    assert_eq!(a.image_path, temp.path().join("img_a.jpg"));
    assert_eq!((a.width, a.height), (100, 50));
    assert_eq!(a.bboxes[0], BBox::new("cat", 1.0, 2.0, 30.0, 40.0));
    assert_eq!(a.bboxes[1], BBox::new("dog", 31.5, 4.0, 80.0, 45.0));

    let b = &outcome.records[1];
    assert_eq!(b.filename, "img_b.jpg");
    assert!(b.bboxes.is_empty());
}

#[test]
fn malformed_file_fails_alone() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_sample_voc_dir(temp.path());
    fs::write(
        temp.path().join("broken.xml"),
        "<annotation><size><width>1</width></size></annotation>",
    )
    .expect("write broken xml");

    let outcome = import_dataset(
        &ImportRequest::new(Format::Voc, temp.path()),
        &CancelFlag::new(),
    )
    .expect("import voc");

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.report.import.failed, 1);
    assert!(outcome.report.has_failures());

    let issue = &outcome.report.issues[0];
    assert_eq!(issue.code, ConversionIssueCode::ParseFailed);
    assert_eq!(
        issue.path.as_deref(),
        Some(temp.path().join("broken.xml").as_path())
    );
}

#[test]
fn write_then_read_keeps_boxes_within_one_pixel() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let record = ImageRecord::new("frame.png", temp.path().join("images/frame.png"), 640, 480)
        .with_bbox(BBox::new("car", 10.7, 20.2, 300.9, 400.5))
        .with_bbox(BBox::new("person & bike", 0.0, 0.0, 639.0, 479.0));

    let xml_path = write_voc_xml(&record, &temp.path().join("out")).expect("write voc");
    assert_eq!(xml_path, temp.path().join("out/frame.xml"));

    let xml = fs::read_to_string(&xml_path).expect("read xml back");
    assert!(!xml.starts_with("<?xml"));
    assert!(xml.contains("<folder>images</folder>"));
    assert!(xml.contains("<name>person &amp; bike</name>"));
    assert!(xml.contains("<xmin>10</xmin>"));

    let restored = read_voc_xml(&xml_path).expect("read voc");
    assert_eq!(restored.filename, "frame.png");
    assert_eq!((restored.width, restored.height), (640, 480));
    for (before, after) in record.bboxes.iter().zip(&restored.bboxes) {
        assert_eq!(before.label, after.label);
        assert!((before.xmin - after.xmin).abs() < 1.0);
        assert!((before.ymin - after.ymin).abs() < 1.0);
        assert!((before.xmax - after.xmax).abs() < 1.0);
        assert!((before.ymax - after.ymax).abs() < 1.0);
    }
}

#[test]
fn voc_to_yolo_writes_labels_and_derived_classes() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let input = temp.path().join("voc");
    let output = temp.path().join("yolo");
    create_sample_voc_dir(&input);

    let cancel = CancelFlag::new();
    let imported =
        import_dataset(&ImportRequest::new(Format::Voc, &input), &cancel).expect("import voc");
    let exported = export_dataset(
        &imported.records,
        &ExportRequest::new(Format::Yolo, &output),
        &cancel,
    )
    .expect("export yolo");

    assert_eq!(exported.report.export.succeeded, 2);
    assert_eq!(
        fs::read_to_string(output.join("classes.txt")).unwrap(),
        "cat\ndog\n"
    );

    let labels = fs::read_to_string(output.join("img_a.txt")).unwrap();
    let first = labels.lines().next().unwrap();
    assert_eq!(first, "0 0.155000 0.420000 0.290000 0.760000");

    // An image without objects still gets an (empty) label file.
    assert_eq!(fs::read_to_string(output.join("img_b.txt")).unwrap(), "");
}
