//! Error types for render mesh processing with rich diagnostics.
//!
//! Every error carries:
//! - A machine-readable error code for programmatic handling
//! - Context about where it happened (file, facet, vertex, worker stage)
//! - A recovery suggestion
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `RMESH-XXXX`:
//! - `RMESH-1xxx`: I/O errors (reading, writing, parsing)
//! - `RMESH-2xxx`: Validation errors (input geometry, parameters)
//! - `RMESH-3xxx`: Processing errors (parallel workers, export layout)
//! - `RMESH-4xxx`: Format errors
//!
//! Degenerate geometry (zero-length vectors, zero-area facets) is never an
//! error: it is absorbed where it is detected and yields zero vectors.
//!
//! # Example
//!
//! ```rust,ignore
//! use render_mesh::{MeshError, ErrorCode};
//!
//! let err = MeshError::invalid_vertex_index(5, 100, 50);
//! println!("Error code: {}", err.code()); // RMESH-2001
//! println!("Recovery: {}", err.recovery_suggestion());
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for render mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes.
///
/// Codes follow the pattern `RMESH-XXXX` where:
/// - 1xxx = I/O errors
/// - 2xxx = Validation errors
/// - 3xxx = Processing errors
/// - 4xxx = Format errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// RMESH-1001: Failed to read file
    IoRead = 1001,
    /// RMESH-1002: Failed to write file
    IoWrite = 1002,
    /// RMESH-1003: Failed to parse file format
    ParseError = 1003,

    // Validation errors (2xxx)
    /// RMESH-2001: Facet references invalid point index
    InvalidVertexIndex = 2001,
    /// RMESH-2002: Point has NaN or Infinity coordinate
    InvalidCoordinate = 2002,
    /// RMESH-2003: Mesh has no points or facets
    EmptyMesh = 2003,
    /// RMESH-2004: Invalid parameter value
    InvalidParameter = 2004,
    /// RMESH-2005: Snapshot buffers disagree in length
    InconsistentSnapshot = 2005,

    // Processing errors (3xxx)
    /// RMESH-3001: A parallel worker failed
    WorkerFailed = 3001,
    /// RMESH-3002: OBJ and MTL files are in different directories
    MaterialDirectoryMismatch = 3002,

    // Format errors (4xxx)
    /// RMESH-4001: Unsupported file format
    UnsupportedFormat = 4001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `RMESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "RMESH-1001",
            ErrorCode::IoWrite => "RMESH-1002",
            ErrorCode::ParseError => "RMESH-1003",
            ErrorCode::InvalidVertexIndex => "RMESH-2001",
            ErrorCode::InvalidCoordinate => "RMESH-2002",
            ErrorCode::EmptyMesh => "RMESH-2003",
            ErrorCode::InvalidParameter => "RMESH-2004",
            ErrorCode::InconsistentSnapshot => "RMESH-2005",
            ErrorCode::WorkerFailed => "RMESH-3001",
            ErrorCode::MaterialDirectoryMismatch => "RMESH-3002",
            ErrorCode::UnsupportedFormat => "RMESH-4001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for mesh errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Re-export the file from the original software with different settings.
    ReexportFile { format: Option<String> },
    /// Use a different file format.
    UseDifferentFormat { suggested: Vec<String> },
    /// Check the source mesh or environment for issues.
    CheckSourceMesh { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Manual intervention may be required.
    ManualIntervention { description: String },
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ReexportFile { format } => {
                if let Some(fmt) = format {
                    write!(
                        f,
                        "Try re-exporting the mesh as {} from the original software",
                        fmt
                    )
                } else {
                    write!(f, "Try re-exporting the mesh from the original software")
                }
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using one of these formats: {}", suggested.join(", "))
            }
            RecoverySuggestion::CheckSourceMesh { checks } => {
                write!(f, "Check: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(name, hint)| format!("{} ({})", name, hint))
                    .collect();
                write!(f, "Adjust parameters: {}", params.join(", "))
            }
            RecoverySuggestion::ManualIntervention { description } => {
                write!(f, "{}", description)
            }
        }
    }
}

/// Where in the mesh or pipeline an error occurred.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshLocation {
    /// A point of the mesh.
    Vertex { index: usize },
    /// A facet of the mesh.
    Facet { index: usize },
    /// A processing stage running on the worker pool.
    Stage { name: &'static str },
    /// A file, with optional line number.
    File { path: PathBuf, line: Option<usize> },
}

impl std::fmt::Display for MeshLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshLocation::Vertex { index } => write!(f, "vertex {}", index),
            MeshLocation::Facet { index } => write!(f, "facet {}", index),
            MeshLocation::Stage { name } => write!(f, "stage '{}'", name),
            MeshLocation::File { path, line } => match line {
                Some(line) => write!(f, "{}:{}", path.display(), line),
                None => write!(f, "{}", path.display()),
            },
        }
    }
}

/// Errors that can occur while building, processing or exporting a render mesh.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error reading from a file.
    #[error("failed to read mesh from {path}")]
    #[diagnostic(
        code(render_mesh::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(render_mesh::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing a mesh file.
    #[error("failed to parse mesh from {path}: {details}")]
    #[diagnostic(
        code(render_mesh::parse::error),
        help("The file may be corrupted. Try re-exporting from the original software.")
    )]
    ParseError { path: PathBuf, details: String },

    /// Unsupported file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(
        code(render_mesh::format::unsupported),
        help("Supported input formats: OBJ, STL")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// Source mesh is empty.
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(render_mesh::validation::empty),
        help("A render mesh needs at least one point and one facet")
    )]
    EmptyMesh { details: String },

    /// Facet references a point index that does not exist.
    #[error(
        "facet {facet_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(
        code(render_mesh::validation::vertex_index),
        help("The source mesh has dangling indices; re-export it or fix the facet list")
    )]
    InvalidVertexIndex {
        facet_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Point has a non-finite coordinate.
    #[error("invalid coordinate at vertex {vertex_index}: {coordinate} is {value}")]
    #[diagnostic(
        code(render_mesh::validation::coordinate),
        help("NaN and infinite coordinates cannot be projected or smoothed")
    )]
    InvalidCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    /// Snapshot buffers have inconsistent lengths.
    #[error("inconsistent mesh snapshot: {details}")]
    #[diagnostic(code(render_mesh::validation::snapshot))]
    InconsistentSnapshot { details: String },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {details}")]
    #[diagnostic(code(render_mesh::validation::parameter))]
    InvalidParameter { name: &'static str, details: String },

    /// A worker of the parallel engine failed; the whole computation is aborted.
    #[error("parallel worker failed during {stage}: {details}")]
    #[diagnostic(
        code(render_mesh::parallel::worker),
        help("Retry with parallel processing disabled to isolate the failure")
    )]
    WorkerFailed { stage: &'static str, details: String },

    /// OBJ and MTL files were requested in different directories.
    #[error("OBJ and MTL files must be in the same directory ('{obj_path}' versus '{mtl_path}')")]
    #[diagnostic(
        code(render_mesh::export::material_directory),
        help("Place the material file next to the OBJ file; the OBJ references it by file name only")
    )]
    MaterialDirectoryMismatch { obj_path: PathBuf, mtl_path: PathBuf },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::IoRead { .. } => ErrorCode::IoRead,
            MeshError::IoWrite { .. } => ErrorCode::IoWrite,
            MeshError::ParseError { .. } => ErrorCode::ParseError,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            MeshError::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            MeshError::InconsistentSnapshot { .. } => ErrorCode::InconsistentSnapshot,
            MeshError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            MeshError::WorkerFailed { .. } => ErrorCode::WorkerFailed,
            MeshError::MaterialDirectoryMismatch { .. } => ErrorCode::MaterialDirectoryMismatch,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            MeshError::IoRead { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            MeshError::IoWrite { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            MeshError::ParseError { .. } => RecoverySuggestion::ReexportFile {
                format: Some("OBJ or binary STL".into()),
            },
            MeshError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["OBJ".into(), "STL".into()],
            },
            MeshError::EmptyMesh { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["mesh has geometry".into(), "correct export settings".into()],
            },
            MeshError::InvalidVertexIndex { .. } | MeshError::InconsistentSnapshot { .. } => {
                RecoverySuggestion::ReexportFile { format: None }
            }
            MeshError::InvalidCoordinate { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["coordinate values".into(), "export precision".into()],
            },
            MeshError::InvalidParameter { name, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![((*name).into(), "use a finite, nonzero value".into())],
            },
            MeshError::WorkerFailed { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("enable_parallel".into(), "set to false".into())],
            },
            MeshError::MaterialDirectoryMismatch { .. } => {
                RecoverySuggestion::ManualIntervention {
                    description: "Write the OBJ and MTL files into the same directory".into(),
                }
            }
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<MeshLocation> {
        match self {
            MeshError::InvalidVertexIndex { facet_index, .. } => Some(MeshLocation::Facet {
                index: *facet_index,
            }),
            MeshError::InvalidCoordinate { vertex_index, .. } => Some(MeshLocation::Vertex {
                index: *vertex_index,
            }),
            MeshError::WorkerFailed { stage, .. } => Some(MeshLocation::Stage { name: stage }),
            MeshError::IoRead { path, .. }
            | MeshError::IoWrite { path, .. }
            | MeshError::ParseError { path, .. } => Some(MeshLocation::File {
                path: path.clone(),
                line: None,
            }),
            MeshError::MaterialDirectoryMismatch { mtl_path, .. } => Some(MeshLocation::File {
                path: mtl_path.clone(),
                line: None,
            }),
            _ => None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(extension: Option<String>) -> Self {
        MeshError::UnsupportedFormat { extension }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        MeshError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create an InvalidVertexIndex error.
    pub fn invalid_vertex_index(facet_index: usize, vertex_index: u32, vertex_count: usize) -> Self {
        MeshError::InvalidVertexIndex {
            facet_index,
            vertex_index,
            vertex_count,
        }
    }

    /// Create an InvalidCoordinate error.
    pub fn invalid_coordinate(vertex_index: usize, coordinate: &'static str, value: f64) -> Self {
        MeshError::InvalidCoordinate {
            vertex_index,
            coordinate,
            value,
        }
    }

    /// Create an InconsistentSnapshot error.
    pub fn inconsistent_snapshot(details: impl Into<String>) -> Self {
        MeshError::InconsistentSnapshot {
            details: details.into(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: &'static str, details: impl Into<String>) -> Self {
        MeshError::InvalidParameter {
            name,
            details: details.into(),
        }
    }

    /// Create a WorkerFailed error.
    pub fn worker_failed(stage: &'static str, details: impl Into<String>) -> Self {
        MeshError::WorkerFailed {
            stage,
            details: details.into(),
        }
    }

    /// Create a MaterialDirectoryMismatch error.
    pub fn material_directory_mismatch(
        obj_path: impl Into<PathBuf>,
        mtl_path: impl Into<PathBuf>,
    ) -> Self {
        MeshError::MaterialDirectoryMismatch {
            obj_path: obj_path.into(),
            mtl_path: mtl_path.into(),
        }
    }
}
