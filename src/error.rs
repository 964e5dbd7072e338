use std::path::PathBuf;
use thiserror::Error;

/// The main error type for unilabel operations.
#[derive(Debug, Error)]
pub enum UnilabelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse VOC XML {path}: {message}")]
    VocXmlParse { path: PathBuf, message: String },

    #[error("Failed to render VOC XML for {filename}")]
    VocXmlWrite { filename: String },

    #[error("Failed to parse YOLO label file {path} at line {line}: {message}")]
    YoloLabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid class list {path}: {message}")]
    ClassListInvalid { path: PathBuf, message: String },

    #[error("Failed to parse class list YAML {path}: {source}")]
    ClassListYamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Invalid image dimensions in {path}: {message}")]
    ImageDimensionInvalid { path: PathBuf, message: String },

    #[error("Failed to parse COCO JSON from {path}: {source}")]
    CocoJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write COCO JSON to {path}: {source}")]
    CocoJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse LabelMe JSON {path}: {message}")]
    LabelMeJsonParse { path: PathBuf, message: String },

    #[error("Failed to write LabelMe JSON to {path}: {source}")]
    LabelMeJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No paired file for {path}: {message}")]
    MissingPairedFile { path: PathBuf, message: String },

    #[error("Invalid geometry for '{filename}': image size {width}x{height} cannot be normalized")]
    InvalidGeometry {
        filename: String,
        width: u32,
        height: u32,
    },

    #[error("Box coordinates for '{filename}' are not finite numbers")]
    NonFiniteCoordinates { filename: String },

    #[error("{path} was already written in this run; '{filename}' maps to the same file")]
    OutputCollision { path: PathBuf, filename: String },

    #[error("Output directory {path} is not empty ({entries} entries); pass --force to overwrite")]
    OutputNotEmpty { path: PathBuf, entries: usize },

    #[error("Failed to read directory {path}: {message}")]
    DirectoryRead { path: PathBuf, message: String },

    #[error("Conversion finished with {failed} failed item(s)")]
    ConversionFailed { failed: usize },

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Failed to serialize report: {0}")]
    ReportSerialize(#[source] serde_json::Error),

    #[error("Unsupported option: {0}")]
    Usage(String),
}

/// Coarse classification of [`UnilabelError`] used in batch reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing required content in a source file.
    Parse,
    /// An annotation has no matching image (or similar sibling).
    MissingPairedFile,
    /// A reference to an id that does not exist in its table.
    UnknownReference,
    /// Geometry that cannot be represented, e.g. a zero-sized image.
    InvalidGeometry,
    /// Two records map to the same output file.
    OutputCollision,
    /// Reading or writing the file system failed.
    Io,
    /// Invalid invocation or refused operation.
    Usage,
}

impl UnilabelError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            UnilabelError::Io(_)
            | UnilabelError::IoAt { .. }
            | UnilabelError::DirectoryRead { .. }
            | UnilabelError::CocoJsonWrite { .. }
            | UnilabelError::LabelMeJsonWrite { .. }
            | UnilabelError::VocXmlWrite { .. }
            | UnilabelError::ReportSerialize(_) => ErrorKind::Io,
            UnilabelError::VocXmlParse { .. }
            | UnilabelError::YoloLabelParse { .. }
            | UnilabelError::ClassListInvalid { .. }
            | UnilabelError::ClassListYamlParse { .. }
            | UnilabelError::ImageDimensionRead { .. }
            | UnilabelError::ImageDimensionInvalid { .. }
            | UnilabelError::CocoJsonParse { .. }
            | UnilabelError::LabelMeJsonParse { .. } => ErrorKind::Parse,
            UnilabelError::MissingPairedFile { .. } => ErrorKind::MissingPairedFile,
            UnilabelError::InvalidGeometry { .. } | UnilabelError::NonFiniteCoordinates { .. } => {
                ErrorKind::InvalidGeometry
            }
            UnilabelError::OutputCollision { .. } => ErrorKind::OutputCollision,
            UnilabelError::OutputNotEmpty { .. }
            | UnilabelError::ConversionFailed { .. }
            | UnilabelError::Cancelled
            | UnilabelError::Usage(_) => ErrorKind::Usage,
        }
    }

    /// Wraps an IO error with the path it occurred at.
    pub(crate) fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UnilabelError::IoAt {
            path: path.into(),
            source,
        }
    }
}
