//! Run summary for a conversion.
//!
//! The report keeps item counts, per-file issues and the counts of boxes and
//! annotations that were dropped on the way, so a user can see exactly what
//! a batch did without reading the logs.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, UnilabelError};

/// A report generated during one conversion run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    /// Source format name.
    pub from: String,
    /// Target format name.
    pub to: String,
    /// Annotation files (or the COCO file) read.
    pub import: StageCounts,
    /// Records written.
    pub export: StageCounts,
    pub counts: ConversionCounts,
    /// Issues discovered while reading or writing.
    pub issues: Vec<ConversionIssue>,
    /// True if the run stopped early on a cancellation request.
    pub cancelled: bool,
}

impl ConversionReport {
    /// Create a new empty report for a conversion between formats.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    /// Add an issue to the report.
    pub fn add(&mut self, issue: ConversionIssue) {
        self.issues.push(issue);
    }

    /// Folds the import or export half of a run into this report.
    pub fn absorb(&mut self, other: ConversionReport) {
        if self.from.is_empty() {
            self.from = other.from;
        }
        if self.to.is_empty() {
            self.to = other.to;
        }
        self.import.absorb(&other.import);
        self.export.absorb(&other.export);
        self.counts.absorb(&other.counts);
        self.issues.extend(other.issues);
        self.cancelled |= other.cancelled;
    }

    pub fn error_count(&self) -> usize {
        self.count_severity(ConversionSeverity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count_severity(ConversionSeverity::Warning)
    }

    pub fn info_count(&self) -> usize {
        self.count_severity(ConversionSeverity::Info)
    }

    /// Returns true if at least one item failed to import or export.
    pub fn has_failures(&self) -> bool {
        self.import.failed + self.export.failed > 0
    }

    fn count_severity(&self, severity: ConversionSeverity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .count()
    }

    fn write_section(
        &self,
        f: &mut fmt::Formatter<'_>,
        title: &str,
        severity: ConversionSeverity,
    ) -> fmt::Result {
        let count = self.count_severity(severity);
        if count == 0 {
            return Ok(());
        }

        writeln!(f)?;
        writeln!(f, "{} ({}):", title, count)?;
        for issue in self.issues.iter().filter(|i| i.severity == severity) {
            match &issue.path {
                Some(path) => writeln!(f, "  - {}: {}", path.display(), issue.message)?,
                None => writeln!(f, "  - {}", issue.message)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        writeln!(f, "Converted {} -> {}", self.from, self.to)?;
        writeln!(f, "  read:    {}", self.import)?;
        writeln!(f, "  written: {}", self.export)?;
        writeln!(
            f,
            "  {} image(s), {} box(es) read, {} box(es) written",
            c.images, c.boxes_read, c.boxes_written
        )?;

        let dropped = c.dropped_annotations + c.unmapped_boxes;
        if dropped > 0 || c.unknown_categories > 0 {
            writeln!(
                f,
                "  dropped: {} annotation(s) with unknown image, {} box(es) with unmapped label; {} annotation(s) with unknown category",
                c.dropped_annotations, c.unmapped_boxes, c.unknown_categories
            )?;
        }

        if self.cancelled {
            writeln!(f, "  cancelled before all items were processed")?;
        }

        self.write_section(f, "Errors", ConversionSeverity::Error)?;
        self.write_section(f, "Warnings", ConversionSeverity::Warning)?;
        self.write_section(f, "Notes", ConversionSeverity::Info)?;

        Ok(())
    }
}

/// Outcome counts for one side of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub items: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items excluded for a recoverable reason such as a missing image.
    pub skipped: usize,
}

impl StageCounts {
    fn absorb(&mut self, other: &StageCounts) {
        self.items += other.items;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for StageCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} item(s), {} succeeded, {} failed, {} skipped",
            self.items, self.succeeded, self.failed, self.skipped
        )
    }
}

/// Image and box counts accumulated over a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversionCounts {
    /// Image records produced by the import.
    pub images: usize,
    pub boxes_read: usize,
    pub boxes_written: usize,
    /// COCO annotations whose `image_id` has no image.
    pub dropped_annotations: usize,
    /// COCO annotations whose `category_id` has no category.
    pub unknown_categories: usize,
    /// Boxes left out of YOLO output because their label is not a class.
    pub unmapped_boxes: usize,
    /// Boxes with `xmin >= xmax` or `ymin >= ymax`.
    pub degenerate_boxes: usize,
}

impl ConversionCounts {
    fn absorb(&mut self, other: &ConversionCounts) {
        self.images += other.images;
        self.boxes_read += other.boxes_read;
        self.boxes_written += other.boxes_written;
        self.dropped_annotations += other.dropped_annotations;
        self.unknown_categories += other.unknown_categories;
        self.unmapped_boxes += other.unmapped_boxes;
        self.degenerate_boxes += other.degenerate_boxes;
    }
}

/// A single issue discovered during a run.
#[derive(Clone, Debug, Serialize)]
pub struct ConversionIssue {
    pub severity: ConversionSeverity,
    pub code: ConversionIssueCode,
    pub message: String,
    /// The offending file, when the issue belongs to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ConversionIssue {
    pub fn error(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self::with_severity(ConversionSeverity::Error, code, message)
    }

    pub fn warning(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self::with_severity(ConversionSeverity::Warning, code, message)
    }

    pub fn info(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self::with_severity(ConversionSeverity::Info, code, message)
    }

    /// Builds the issue for an item that failed with `err`.
    ///
    /// A missing paired file is a warning (the item is skipped); everything
    /// else is an error.
    pub fn from_error(path: &Path, err: &UnilabelError) -> Self {
        let kind = err.kind();
        let severity = match kind {
            ErrorKind::MissingPairedFile => ConversionSeverity::Warning,
            _ => ConversionSeverity::Error,
        };
        Self::with_severity(severity, kind.into(), err.to_string()).at(path)
    }

    /// Attaches the offending file.
    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn with_severity(
        severity: ConversionSeverity,
        code: ConversionIssueCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            path: None,
        }
    }
}

/// Severity level for conversion issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSeverity {
    /// The item failed and produced no output.
    Error,
    /// The item was skipped or lost information.
    Warning,
    /// A note about a policy decision.
    Info,
}

/// Stable issue codes for programmatic consumption.
///
/// These codes are part of the JSON report and should remain stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionIssueCode {
    /// A source file is malformed or lacks required content.
    ParseFailed,
    /// An annotation has no paired image.
    MissingPairedFile,
    /// COCO annotations referenced an image id that does not exist.
    UnknownImageReference,
    /// COCO annotations referenced a category id that does not exist.
    UnknownCategory,
    /// A box could not be normalized against the image size.
    InvalidGeometry,
    /// A record would overwrite a file written earlier in the same run.
    OutputCollision,
    /// Reading or writing a file failed.
    IoFailure,
    /// The operation was refused.
    Refused,
    /// YOLO output left out boxes whose label is not in the class list.
    UnmappedLabel,
    /// Boxes with inverted or zero extent were passed through unchanged.
    DegenerateBox,
    /// The YOLO class list was derived from the labels in the batch.
    ClassListDerived,
    /// No class list was found; YOLO class ids are used as labels.
    ClassListMissing,
    /// The run was cancelled before all items were processed.
    Cancelled,
}

impl From<ErrorKind> for ConversionIssueCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Parse => ConversionIssueCode::ParseFailed,
            ErrorKind::MissingPairedFile => ConversionIssueCode::MissingPairedFile,
            ErrorKind::UnknownReference => ConversionIssueCode::UnknownImageReference,
            ErrorKind::InvalidGeometry => ConversionIssueCode::InvalidGeometry,
            ErrorKind::OutputCollision => ConversionIssueCode::OutputCollision,
            ErrorKind::Io => ConversionIssueCode::IoFailure,
            ErrorKind::Usage => ConversionIssueCode::Refused,
        }
    }
}
