//! Unilabel: convert object detection annotations between formats.
//!
//! Unilabel reads Pascal VOC, YOLO, COCO and LabelMe annotations into one
//! intermediate representation (IR) and writes any of them back out, so
//! every pair of formats works with one reader and one writer per format.
//!
//! # Modules
//!
//! - [`ir`]: Intermediate representation types and the per-format readers
//!   and writers
//! - [`conversion`]: Batch import/export, cancellation and the run report
//! - [`error`]: Error types for unilabel operations

pub mod conversion;
pub mod error;
pub mod ir;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::warn;

use conversion::{CancelFlag, ExportRequest, Format, ImportRequest, OutputState};
use ir::io_coco_json::DEFAULT_COCO_FILE_NAME;
use ir::ClassList;

pub use error::UnilabelError;

/// The unilabel CLI application.
#[derive(Parser)]
#[command(name = "unilabel")]
#[command(version, author, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Number of `-v` flags given.
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert annotations from one format to another.
    Convert(ConvertArgs),
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Source format.
    #[arg(long, value_enum)]
    from: Format,

    /// Target format.
    #[arg(long, value_enum)]
    to: Format,

    /// Annotation directory, single annotation file, or COCO JSON file.
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory.
    #[arg(short, long)]
    output: PathBuf,

    /// Class list (classes.txt or data.yaml). YOLO input: maps class ids to
    /// names (default: <input>/classes.txt). YOLO output: fixes class order.
    #[arg(long)]
    classes: Option<PathBuf>,

    /// Directory holding the images of a COCO input (default: the JSON's directory).
    #[arg(long)]
    image_root: Option<PathBuf>,

    /// File name of the COCO output inside the output directory.
    #[arg(long, default_value = DEFAULT_COCO_FILE_NAME)]
    coco_file: String,

    /// Search subdirectories of the input for annotation files.
    #[arg(long)]
    recursive: bool,

    /// Write into a non-empty output directory, overwriting files with the same name.
    #[arg(long, env = "UNILABEL_FORCE")]
    force: bool,

    /// Report format printed to stdout.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

/// Parse the command line and run unilabel.
///
/// Convenience for callers that do not need to set up logging first.
pub fn run() -> Result<(), UnilabelError> {
    run_cli(Cli::parse())
}

/// Run an already-parsed command line.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run_cli(cli: Cli) -> Result<(), UnilabelError> {
    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        None => {
            println!("unilabel {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Convert annotations between VOC, YOLO, COCO and LabelMe.");
            println!();
            println!("Run 'unilabel --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the convert subcommand.
fn run_convert(args: ConvertArgs) -> Result<(), UnilabelError> {
    if args.classes.is_some() && args.from != Format::Yolo && args.to != Format::Yolo {
        return Err(UnilabelError::Usage(
            "--classes only applies when converting from or to yolo".to_string(),
        ));
    }
    if args.image_root.is_some() && args.from != Format::Coco {
        return Err(UnilabelError::Usage(
            "--image-root only applies when converting from coco".to_string(),
        ));
    }

    if let OutputState::NonEmpty { entries } = conversion::preflight_output(&args.output)? {
        if !args.force {
            return Err(UnilabelError::OutputNotEmpty {
                path: args.output,
                entries,
            });
        }
        warn!(
            path = %args.output.display(),
            entries,
            "writing into a non-empty output directory"
        );
    }

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.cancel()) {
        warn!("could not install Ctrl-C handler: {err}");
    }

    let mut import = ImportRequest::new(args.from, &args.input);
    import.image_root = args.image_root;
    import.recursive = args.recursive;
    if args.from == Format::Yolo {
        import.classes = args.classes.clone();
    }

    let mut export = ExportRequest::new(args.to, &args.output);
    export.coco_file_name = args.coco_file;
    if args.to == Format::Yolo {
        export.classes = args.classes.as_deref().map(ClassList::read).transpose()?;
    }

    let report = conversion::convert(&import, &export, &cancel)?;

    match args.report {
        ReportFormat::Json => {
            let json =
                serde_json::to_string_pretty(&report).map_err(UnilabelError::ReportSerialize)?;
            println!("{json}");
        }
        ReportFormat::Text => print!("{report}"),
    }

    if report.has_failures() {
        return Err(UnilabelError::ConversionFailed {
            failed: report.import.failed + report.export.failed,
        });
    }
    if report.cancelled {
        return Err(UnilabelError::Cancelled);
    }
    Ok(())
}
