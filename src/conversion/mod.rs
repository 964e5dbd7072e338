//! Conversion orchestration.
//!
//! A run is one import followed by one export. The importer for the source
//! [`Format`] turns annotation files into [`ImageRecord`]s; the exporter for
//! the target format writes them back out. One item failing never stops the
//! batch: failures are collected into the [`ConversionReport`] with the path
//! of the offending file.

pub mod report;

pub use report::{
    ConversionCounts, ConversionIssue, ConversionIssueCode, ConversionReport, ConversionSeverity,
    StageCounts,
};

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ErrorKind, UnilabelError};
use crate::ir::io_coco_json::{self, DEFAULT_COCO_FILE_NAME};
use crate::ir::{
    find_sibling_image, io_labelme_json, io_voc_xml, io_yolo, is_storable_class_name, BBox,
    ClassList, ImageRecord, CLASSES_TXT, IMAGE_EXTENSIONS,
};

/// Annotation formats unilabel reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Format {
    /// Pascal VOC: one XML file per image.
    Voc,
    /// YOLO: one text file per image plus `classes.txt`.
    Yolo,
    /// COCO: one JSON file for the whole dataset.
    Coco,
    /// LabelMe: one JSON file per image.
    #[value(name = "labelme")]
    LabelMe,
}

/// How a format lays out its annotation files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// One annotation file per image, named after the image.
    PerImage,
    /// One file for the whole dataset.
    SingleFile,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Voc, Format::Yolo, Format::Coco, Format::LabelMe];

    /// Name used on the command line and in reports.
    pub fn name(self) -> &'static str {
        match self {
            Format::Voc => "voc",
            Format::Yolo => "yolo",
            Format::Coco => "coco",
            Format::LabelMe => "labelme",
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            Format::Coco => Layout::SingleFile,
            Format::Voc | Format::Yolo | Format::LabelMe => Layout::PerImage,
        }
    }

    /// Extension of the annotation files, without the dot.
    pub fn annotation_extension(self) -> &'static str {
        match self {
            Format::Voc => io_voc_xml::VOC_XML_EXTENSION,
            Format::Yolo => io_yolo::LABEL_EXTENSION,
            Format::Coco => "json",
            Format::LabelMe => io_labelme_json::LABELME_EXTENSION,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = UnilabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "voc" | "pascal-voc" => Ok(Format::Voc),
            "yolo" => Ok(Format::Yolo),
            "coco" | "coco-json" => Ok(Format::Coco),
            "labelme" => Ok(Format::LabelMe),
            other => Err(UnilabelError::Usage(format!(
                "unknown format '{other}' (supported: voc, yolo, coco, labelme)"
            ))),
        }
    }
}

/// Shared cancellation request, checked before each item.
///
/// Clones share the same flag, so one clone can be handed to a signal
/// handler while the run holds another.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to read.
#[derive(Clone, Debug)]
pub struct ImportRequest {
    pub format: Format,
    /// Directory of per-image annotation files, a single annotation file,
    /// or the COCO JSON file.
    pub input: PathBuf,
    /// COCO only: directory holding the images. Defaults to the JSON's
    /// directory.
    pub image_root: Option<PathBuf>,
    /// YOLO only: class list file. Defaults to `classes.txt` in the input
    /// directory.
    pub classes: Option<PathBuf>,
    /// Descend into subdirectories when enumerating annotation files.
    pub recursive: bool,
}

impl ImportRequest {
    pub fn new(format: Format, input: impl Into<PathBuf>) -> Self {
        Self {
            format,
            input: input.into(),
            image_root: None,
            classes: None,
            recursive: false,
        }
    }
}

/// Records read by [`import_dataset`] and the import half of the report.
#[derive(Clone, Debug)]
pub struct ImportOutcome {
    pub records: Vec<ImageRecord>,
    pub report: ConversionReport,
}

/// Where and how to write.
#[derive(Clone, Debug)]
pub struct ExportRequest {
    pub format: Format,
    /// Output directory.
    pub output: PathBuf,
    /// YOLO only: explicit class order. Derived from the records when unset.
    pub classes: Option<ClassList>,
    /// COCO only: name of the JSON file inside `output`.
    pub coco_file_name: String,
}

impl ExportRequest {
    pub fn new(format: Format, output: impl Into<PathBuf>) -> Self {
        Self {
            format,
            output: output.into(),
            classes: None,
            coco_file_name: DEFAULT_COCO_FILE_NAME.to_string(),
        }
    }
}

/// Files written by [`export_dataset`] and the export half of the report.
#[derive(Clone, Debug)]
pub struct ExportOutcome {
    pub written: Vec<PathBuf>,
    pub report: ConversionReport,
}

/// State of an output directory before a run writes into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputState {
    Missing,
    Empty,
    NonEmpty { entries: usize },
}

impl OutputState {
    /// Returns true if writing here may overwrite existing files.
    pub fn requires_confirmation(self) -> bool {
        matches!(self, OutputState::NonEmpty { .. })
    }
}

/// Reports whether `path` already holds files.
///
/// The caller decides what to do about a non-empty directory.
pub fn preflight_output(path: &Path) -> Result<OutputState, UnilabelError> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(OutputState::Missing),
        Err(err) => return Err(UnilabelError::io_at(path, err)),
    };

    let count = entries.count();
    Ok(if count == 0 {
        OutputState::Empty
    } else {
        OutputState::NonEmpty { entries: count }
    })
}

/// Picks the class list for a YOLO export: the explicit list when given,
/// otherwise the sorted distinct labels of all records.
///
/// Derived lists leave out labels that `classes.txt` cannot hold (see
/// [`is_storable_class_name`]); boxes with those labels end up unmapped.
pub fn resolve_class_list(records: &[ImageRecord], explicit: Option<&ClassList>) -> ClassList {
    match explicit {
        Some(classes) => classes.clone(),
        None => ClassList::new(
            ClassList::derive(records)
                .names()
                .iter()
                .filter(|name| is_storable_class_name(name))
                .cloned(),
        ),
    }
}

/// Reads every item of the source dataset.
///
/// Per-item failures end up in the report. An `Err` means the run could not
/// start at all, e.g. the input does not exist or an explicit class list is
/// unreadable.
pub fn import_dataset(
    request: &ImportRequest,
    cancel: &CancelFlag,
) -> Result<ImportOutcome, UnilabelError> {
    let mut report = ConversionReport::new(request.format.name(), "");

    let records = match request.format {
        Format::Coco => import_coco(request, cancel, &mut report),
        Format::Voc => import_each(request, cancel, &mut report, io_voc_xml::read_voc_xml)?,
        Format::LabelMe => {
            import_each(request, cancel, &mut report, io_labelme_json::read_labelme_json)?
        }
        Format::Yolo => {
            let classes = load_import_classes(request, &mut report)?;
            import_each(request, cancel, &mut report, |path| {
                read_yolo_item(path, &classes)
            })?
        }
    };

    report.counts.images = records.len();
    report.counts.boxes_read = records.iter().map(|record| record.bboxes.len()).sum();
    note_degenerate_boxes(&records, &mut report);

    info!(
        format = request.format.name(),
        images = report.counts.images,
        boxes = report.counts.boxes_read,
        failed = report.import.failed,
        "import finished"
    );

    Ok(ImportOutcome { records, report })
}

/// Writes `records` in the target format.
///
/// Per-item failures end up in the report. An `Err` means nothing sensible
/// could be written, e.g. the YOLO class list could not be saved.
pub fn export_dataset(
    records: &[ImageRecord],
    request: &ExportRequest,
    cancel: &CancelFlag,
) -> Result<ExportOutcome, UnilabelError> {
    let mut report = ConversionReport::new("", request.format.name());
    let mut written = Vec::new();

    match request.format {
        Format::Coco => export_coco(records, request, cancel, &mut report, &mut written),
        Format::Voc => export_each(records, request, cancel, &mut report, &mut written, |record, dir| {
            io_voc_xml::write_voc_xml(record, dir).map(|path| (path, record.bboxes.len()))
        }),
        Format::LabelMe => {
            export_each(records, request, cancel, &mut report, &mut written, |record, dir| {
                io_labelme_json::write_labelme_json(record, dir)
                    .map(|path| (path, record.bboxes.len()))
            })
        }
        Format::Yolo => {
            // The class list is fixed before any label file is written.
            let classes = resolve_class_list(records, request.classes.as_ref());
            if request.classes.is_none() {
                for label in ClassList::derive(records).names() {
                    if classes.index_of(label).is_none() {
                        report.add(ConversionIssue::warning(
                            ConversionIssueCode::UnmappedLabel,
                            format!(
                                "label {label:?} cannot be stored in {CLASSES_TXT}; its boxes are left out"
                            ),
                        ));
                    }
                }
                report.add(ConversionIssue::info(
                    ConversionIssueCode::ClassListDerived,
                    format!(
                        "class list derived from labels: {} class(es) in lexicographic order",
                        classes.len()
                    ),
                ));
            }

            fs::create_dir_all(&request.output)
                .map_err(|source| UnilabelError::io_at(&request.output, source))?;
            let classes_path = request.output.join(CLASSES_TXT);
            classes.write(&classes_path)?;
            written.push(classes_path);

            let mut unmapped = 0;
            export_each(records, request, cancel, &mut report, &mut written, |record, dir| {
                let (path, labels) = io_yolo::write_yolo_txt(record, dir, &classes)?;
                unmapped += labels.dropped;
                Ok((path, labels.written))
            });

            report.counts.unmapped_boxes = unmapped;
            if unmapped > 0 {
                warn!(boxes = unmapped, "boxes left out of YOLO output: label not in class list");
                report.add(ConversionIssue::warning(
                    ConversionIssueCode::UnmappedLabel,
                    format!("{unmapped} box(es) dropped: label not in the class list"),
                ));
            }
        }
    }

    info!(
        format = request.format.name(),
        written = report.export.succeeded,
        failed = report.export.failed,
        "export finished"
    );

    Ok(ExportOutcome { written, report })
}

/// Runs an import followed by an export and returns the merged report.
pub fn convert(
    import: &ImportRequest,
    export: &ExportRequest,
    cancel: &CancelFlag,
) -> Result<ConversionReport, UnilabelError> {
    let imported = import_dataset(import, cancel)?;
    let mut report = imported.report;

    if report.cancelled {
        report.to = export.format.name().to_string();
        return Ok(report);
    }

    let exported = export_dataset(&imported.records, export, cancel)?;
    report.absorb(exported.report);
    Ok(report)
}

// ============================================================================
// Import helpers
// ============================================================================

fn import_each<F>(
    request: &ImportRequest,
    cancel: &CancelFlag,
    report: &mut ConversionReport,
    mut read: F,
) -> Result<Vec<ImageRecord>, UnilabelError>
where
    F: FnMut(&Path) -> Result<ImageRecord, UnilabelError>,
{
    let files = annotation_files(request)?;
    debug!(
        count = files.len(),
        input = %request.input.display(),
        "annotation files found"
    );

    let mut records = Vec::with_capacity(files.len());
    for path in files {
        if cancel.is_cancelled() {
            mark_cancelled(report);
            break;
        }

        report.import.items += 1;
        match read(&path) {
            Ok(record) => {
                debug!(path = %path.display(), boxes = record.bboxes.len(), "read");
                report.import.succeeded += 1;
                records.push(record);
            }
            Err(err) => record_failure(&mut report.import, &mut report.issues, &path, &err),
        }
    }

    Ok(records)
}

fn import_coco(
    request: &ImportRequest,
    cancel: &CancelFlag,
    report: &mut ConversionReport,
) -> Vec<ImageRecord> {
    if cancel.is_cancelled() {
        mark_cancelled(report);
        return Vec::new();
    }

    let json_path = &request.input;
    let image_root = request.image_root.clone().unwrap_or_else(|| {
        json_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });

    report.import.items += 1;
    let import = match io_coco_json::read_coco_json(json_path, &image_root) {
        Ok(import) => import,
        Err(err) => {
            record_failure(&mut report.import, &mut report.issues, json_path, &err);
            return Vec::new();
        }
    };
    report.import.succeeded += 1;

    report.counts.dropped_annotations = import.dropped_annotations;
    report.counts.unknown_categories = import.unknown_categories;
    if import.dropped_annotations > 0 {
        report.add(
            ConversionIssue::warning(
                ConversionIssueCode::UnknownImageReference,
                format!(
                    "{} annotation(s) dropped: image_id not in images",
                    import.dropped_annotations
                ),
            )
            .at(json_path),
        );
    }
    if import.unknown_categories > 0 {
        report.add(
            ConversionIssue::warning(
                ConversionIssueCode::UnknownCategory,
                format!(
                    "{} annotation(s) labelled '{}': category_id not in categories",
                    import.unknown_categories,
                    io_coco_json::UNKNOWN_CATEGORY
                ),
            )
            .at(json_path),
        );
    }

    import.records
}

/// Lists annotation files for a per-image format, sorted by file name.
fn annotation_files(request: &ImportRequest) -> Result<Vec<PathBuf>, UnilabelError> {
    let input = &request.input;
    if input.is_file() {
        return Ok(vec![input.clone()]);
    }
    if !input.is_dir() {
        return Err(UnilabelError::DirectoryRead {
            path: input.clone(),
            message: "not a file or directory".to_string(),
        });
    }

    let extension = request.format.annotation_extension();
    let mut walker = WalkDir::new(input).min_depth(1).sort_by_file_name();
    if !request.recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| UnilabelError::DirectoryRead {
            path: input.clone(),
            message: source.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let has_extension = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if !has_extension {
            continue;
        }
        if request.format == Format::Yolo && entry.file_name() == CLASSES_TXT {
            continue;
        }

        files.push(entry.into_path());
    }

    Ok(files)
}

fn load_import_classes(
    request: &ImportRequest,
    report: &mut ConversionReport,
) -> Result<ClassList, UnilabelError> {
    if let Some(path) = &request.classes {
        return ClassList::read(path);
    }

    let dir = if request.input.is_file() {
        request.input.parent().unwrap_or(Path::new(""))
    } else {
        request.input.as_path()
    };
    let default_path = dir.join(CLASSES_TXT);
    if default_path.is_file() {
        return ClassList::read(&default_path);
    }

    warn!(path = %default_path.display(), "no class list; class ids become labels");
    report.add(
        ConversionIssue::warning(
            ConversionIssueCode::ClassListMissing,
            "no class list found; numeric class ids are used as labels",
        )
        .at(default_path),
    );
    Ok(ClassList::default())
}

fn read_yolo_item(txt_path: &Path, classes: &ClassList) -> Result<ImageRecord, UnilabelError> {
    let image_path =
        find_sibling_image(txt_path).ok_or_else(|| UnilabelError::MissingPairedFile {
            path: txt_path.to_path_buf(),
            message: format!("no image with extension {}", IMAGE_EXTENSIONS.join(", ")),
        })?;
    io_yolo::read_yolo_txt(txt_path, &image_path, classes)
}

fn note_degenerate_boxes(records: &[ImageRecord], report: &mut ConversionReport) {
    let degenerate = records
        .iter()
        .flat_map(|record| record.bboxes.iter())
        .filter(|bbox| !bbox.is_ordered())
        .count();

    report.counts.degenerate_boxes = degenerate;
    if degenerate > 0 {
        report.add(ConversionIssue::info(
            ConversionIssueCode::DegenerateBox,
            format!("{degenerate} box(es) have xmin >= xmax or ymin >= ymax; passed through unchanged"),
        ));
    }
}

// ============================================================================
// Export helpers
// ============================================================================

fn export_each<F>(
    records: &[ImageRecord],
    request: &ExportRequest,
    cancel: &CancelFlag,
    report: &mut ConversionReport,
    written: &mut Vec<PathBuf>,
    mut write: F,
) where
    F: FnMut(&ImageRecord, &Path) -> Result<(PathBuf, usize), UnilabelError>,
{
    let extension = request.format.annotation_extension();
    // Files already written in this run, e.g. classes.txt, count as taken.
    let mut targets: HashSet<PathBuf> = written.iter().cloned().collect();

    for record in records {
        if cancel.is_cancelled() {
            mark_cancelled(report);
            break;
        }

        report.export.items += 1;
        let target = request.output.join(record.annotation_file_name(extension));
        if targets.contains(&target) {
            let err = UnilabelError::OutputCollision {
                path: target.clone(),
                filename: record.filename.clone(),
            };
            record_failure(&mut report.export, &mut report.issues, &target, &err);
            continue;
        }
        if let Err(err) = check_finite(record) {
            record_failure(&mut report.export, &mut report.issues, &target, &err);
            continue;
        }

        match write(record, &request.output) {
            Ok((path, boxes)) => {
                debug!(path = %path.display(), boxes, "wrote");
                report.export.succeeded += 1;
                report.counts.boxes_written += boxes;
                targets.insert(path.clone());
                written.push(path);
            }
            Err(err) => record_failure(&mut report.export, &mut report.issues, &target, &err),
        }
    }
}

fn export_coco(
    records: &[ImageRecord],
    request: &ExportRequest,
    cancel: &CancelFlag,
    report: &mut ConversionReport,
    written: &mut Vec<PathBuf>,
) {
    if cancel.is_cancelled() {
        mark_cancelled(report);
        return;
    }

    let path = request.output.join(&request.coco_file_name);
    report.export.items += 1;
    if let Err(err) = records.iter().try_for_each(check_finite) {
        record_failure(&mut report.export, &mut report.issues, &path, &err);
        return;
    }

    match io_coco_json::write_coco_json(&path, records) {
        Ok(()) => {
            debug!(path = %path.display(), images = records.len(), "wrote");
            report.export.succeeded += 1;
            report.counts.boxes_written += records.iter().map(|r| r.bboxes.len()).sum::<usize>();
            written.push(path);
        }
        Err(err) => record_failure(&mut report.export, &mut report.issues, &path, &err),
    }
}

// ============================================================================
// Shared
// ============================================================================

/// Fails if any box has a NaN or infinite coordinate.
fn check_finite(record: &ImageRecord) -> Result<(), UnilabelError> {
    if record.bboxes.iter().all(BBox::is_finite) {
        Ok(())
    } else {
        Err(UnilabelError::NonFiniteCoordinates {
            filename: record.filename.clone(),
        })
    }
}

fn record_failure(
    stage: &mut StageCounts,
    issues: &mut Vec<ConversionIssue>,
    path: &Path,
    err: &UnilabelError,
) {
    if err.kind() == ErrorKind::MissingPairedFile {
        stage.skipped += 1;
        warn!(path = %path.display(), "skipped: {err}");
    } else {
        stage.failed += 1;
        warn!(path = %path.display(), "failed: {err}");
    }
    issues.push(ConversionIssue::from_error(path, err));
}

fn mark_cancelled(report: &mut ConversionReport) {
    if report.cancelled {
        return;
    }
    warn!("cancellation requested; stopping before the next item");
    report.cancelled = true;
    report.add(ConversionIssue::info(
        ConversionIssueCode::Cancelled,
        "run cancelled; remaining items were not processed",
    ));
}
