//! Processing parameters for render meshes.

use std::f64::consts::PI;

use crate::error::{MeshError, MeshResult};

/// Default dihedral split angle: 30 degrees.
pub const DEFAULT_SPLIT_ANGLE: f64 = PI / 6.0;

/// Default point count above which the parallel path is taken.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 2000;

/// Default number of facets per worker chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 20_000;

/// UV projection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "params-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum UvProjection {
    /// Do not compute a UV map.
    #[default]
    None,
    /// Six orthogonal projections, one per cube face.
    Cube,
    /// Spherical (longitude/latitude) projection around the center of gravity.
    Sphere,
    /// Cylindrical projection around the z axis, with planar caps.
    Cylinder,
}

impl UvProjection {
    /// Short name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            UvProjection::None => "none",
            UvProjection::Cube => "cube",
            UvProjection::Sphere => "sphere",
            UvProjection::Cylinder => "cylinder",
        }
    }
}

impl std::fmt::Display for UvProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for building a [`crate::RenderMesh`].
///
/// Angles are in radians. Coordinates are unit-agnostic; `uv_unit_scale`
/// converts them into texture space (e.g. 0.001 for a millimetre scene
/// textured in metres).
///
/// # Example
///
/// ```
/// use render_mesh::{RenderMeshParams, UvProjection};
///
/// // Use defaults: autosmooth at 30 degrees, no UV map
/// let params = RenderMeshParams::default();
///
/// // Or customize for your use case
/// let params = RenderMeshParams {
///     split_angle: 45f64.to_radians(),
///     uv_projection: UvProjection::Cube,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "params-config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RenderMeshParams {
    /// Run adjacency, component splitting and normal weighting.
    pub autosmooth: bool,

    /// Dihedral angle above which adjacent facets are split (hard edge).
    ///
    /// Serialized in degrees.
    #[cfg_attr(
        feature = "params-config",
        serde(rename = "split_angle_deg", with = "degrees")
    )]
    pub split_angle: f64,

    /// UV projection to compute before autosmooth.
    pub uv_projection: UvProjection,

    /// Multiplier applied to projected coordinates.
    pub uv_unit_scale: f64,

    /// Allow the parallel execution path.
    pub enable_parallel: bool,

    /// Minimum point count for parallel dispatch.
    pub parallel_threshold: usize,

    /// Facets per worker chunk.
    pub chunk_size: usize,

    /// Worker pool size; `None` uses every available core.
    pub worker_count: Option<usize>,

    /// Prefer the sort-based adjacency and batched normal kernels.
    ///
    /// Falls back to the scalar kernels when the crate is built without the
    /// `vectorized` feature.
    pub enable_vectorized_fastpath: bool,
}

impl Default for RenderMeshParams {
    fn default() -> Self {
        Self {
            autosmooth: true,
            split_angle: DEFAULT_SPLIT_ANGLE,
            uv_projection: UvProjection::None,
            uv_unit_scale: 1.0,
            enable_parallel: true,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            worker_count: None,
            enable_vectorized_fastpath: true,
        }
    }
}

impl RenderMeshParams {
    /// Create parameters with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap settings for interactive previews: no UV, single-threaded.
    pub fn for_preview() -> Self {
        Self {
            uv_projection: UvProjection::None,
            enable_parallel: false,
            ..Self::default()
        }
    }

    /// Settings for large meshes: parallel dispatch with a low threshold.
    pub fn for_large_meshes() -> Self {
        Self {
            enable_parallel: true,
            parallel_threshold: 500,
            chunk_size: 50_000,
            ..Self::default()
        }
    }

    /// Tighter split angle (15 degrees) for mechanical, hard-surface models.
    pub fn hard_surface() -> Self {
        Self {
            split_angle: 15f64.to_radians(),
            ..Self::default()
        }
    }

    /// Default settings with a UV projection.
    pub fn with_uv(projection: UvProjection) -> Self {
        Self {
            uv_projection: projection,
            ..Self::default()
        }
    }

    /// Set the split angle in degrees.
    pub fn with_split_angle_deg(mut self, degrees: f64) -> Self {
        self.split_angle = degrees.to_radians();
        self
    }

    /// Set the UV projection.
    pub fn with_uv_projection(mut self, projection: UvProjection) -> Self {
        self.uv_projection = projection;
        self
    }

    /// Enable or disable autosmooth.
    pub fn with_autosmooth(mut self, autosmooth: bool) -> Self {
        self.autosmooth = autosmooth;
        self
    }

    /// Enable or disable parallel execution.
    pub fn with_parallel(mut self, enable: bool) -> Self {
        self.enable_parallel = enable;
        self
    }

    /// Set the point count threshold for parallel execution.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Set the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the worker pool size.
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    /// Enable or disable the vectorized kernels.
    pub fn with_vectorized(mut self, enable: bool) -> Self {
        self.enable_vectorized_fastpath = enable;
        self
    }

    /// Set the UV unit scale.
    pub fn with_uv_unit_scale(mut self, scale: f64) -> Self {
        self.uv_unit_scale = scale;
        self
    }

    /// Cosine of the split angle, the threshold on normal dot products.
    #[inline]
    pub fn split_angle_cos(&self) -> f64 {
        self.split_angle.cos()
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> MeshResult<()> {
        if !self.split_angle.is_finite() || self.split_angle < 0.0 {
            return Err(MeshError::invalid_parameter(
                "split_angle",
                format!("expected a finite, non-negative angle, got {}", self.split_angle),
            ));
        }
        if self.chunk_size == 0 {
            return Err(MeshError::invalid_parameter("chunk_size", "must be at least 1"));
        }
        if self.worker_count == Some(0) {
            return Err(MeshError::invalid_parameter("worker_count", "must be at least 1"));
        }
        if !self.uv_unit_scale.is_finite() || self.uv_unit_scale == 0.0 {
            return Err(MeshError::invalid_parameter(
                "uv_unit_scale",
                format!("expected a finite, nonzero scale, got {}", self.uv_unit_scale),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "params-config")]
mod degrees {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(radians: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(radians.to_degrees())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        f64::deserialize(deserializer).map(f64::to_radians)
    }
}

/// Errors that can occur when loading or saving parameter files.
#[cfg(feature = "params-config")]
#[derive(Debug)]
pub enum ParamsConfigError {
    /// I/O error reading or writing file.
    Io(std::io::Error),
    /// TOML parsing error.
    TomlParse(toml::de::Error),
    /// TOML serialization error.
    TomlSerialize(toml::ser::Error),
    /// JSON parsing or serialization error.
    Json(serde_json::Error),
    /// File extension is neither `.toml` nor `.json`.
    UnknownExtension(Option<String>),
}

#[cfg(feature = "params-config")]
impl std::fmt::Display for ParamsConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::TomlParse(e) => write!(f, "TOML parse error: {}", e),
            Self::TomlSerialize(e) => write!(f, "TOML serialize error: {}", e),
            Self::Json(e) => write!(f, "JSON error: {}", e),
            Self::UnknownExtension(ext) => {
                write!(f, "unknown parameter file extension: {:?}", ext)
            }
        }
    }
}

#[cfg(feature = "params-config")]
impl std::error::Error for ParamsConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::TomlParse(e) => Some(e),
            Self::TomlSerialize(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::UnknownExtension(_) => None,
        }
    }
}

#[cfg(feature = "params-config")]
impl From<std::io::Error> for ParamsConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "params-config")]
impl From<toml::de::Error> for ParamsConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::TomlParse(e)
    }
}

#[cfg(feature = "params-config")]
impl From<toml::ser::Error> for ParamsConfigError {
    fn from(e: toml::ser::Error) -> Self {
        Self::TomlSerialize(e)
    }
}

#[cfg(feature = "params-config")]
impl From<serde_json::Error> for ParamsConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

#[cfg(feature = "params-config")]
impl RenderMeshParams {
    /// Load parameters from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ParamsConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ParamsConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load parameters from a JSON string.
    pub fn from_json_str(json_str: &str) -> Result<Self, ParamsConfigError> {
        Ok(serde_json::from_str(json_str)?)
    }

    /// Serialize to a JSON string.
    pub fn to_json_string(&self) -> Result<String, ParamsConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load parameters from a `.toml` or `.json` file.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ParamsConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match extension_of(path).as_deref() {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            other => Err(ParamsConfigError::UnknownExtension(other.map(String::from))),
        }
    }

    /// Save parameters to a `.toml` or `.json` file.
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ParamsConfigError> {
        let path = path.as_ref();
        let content = match extension_of(path).as_deref() {
            Some("toml") => self.to_toml_string()?,
            Some("json") => self.to_json_string()?,
            other => return Err(ParamsConfigError::UnknownExtension(other.map(String::from))),
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(feature = "params-config")]
fn extension_of(path: &std::path::Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
