//! Mesh loading (OBJ, STL) and OBJ/MTL export.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::parallel::{Executor, chunk_ranges};
use crate::render_mesh::RenderMesh;
use crate::tracing_ext::{OperationTimer, log_io_operation};
use crate::types::SourceMesh;
use crate::uvmap::UvTransform;
use crate::validate::validate_source;

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Stl,
    Obj,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "stl" => Some(MeshFormat::Stl),
                "obj" => Some(MeshFormat::Obj),
                _ => None,
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::Obj => "obj",
        }
    }
}

/// Load a mesh from file, detecting the format from the extension.
///
/// The result is validated: it is non-empty, finite and has no dangling
/// indices.
pub fn load_mesh(path: &Path) -> MeshResult<SourceMesh> {
    let format = MeshFormat::from_path(path).ok_or_else(|| {
        MeshError::unsupported_format(path.extension().and_then(|e| e.to_str()).map(String::from))
    })?;

    info!("Loading mesh from {:?} (format: {:?})", path, format);

    let mesh = match format {
        MeshFormat::Stl => load_stl(path)?,
        MeshFormat::Obj => load_obj(path)?,
    };

    if let Some((min, max)) = mesh.bounds() {
        let dims = max - min;
        info!(
            "Loaded mesh: {} points, {} facets",
            mesh.point_count(),
            mesh.facet_count()
        );
        debug!("Dimensions: {:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z);
    }

    let validated = validate_source(&mesh);
    log_io_operation("load", path, Some(format.as_str()), validated.is_ok());
    validated?;
    Ok(mesh)
}

/// Load an STL file (binary or ASCII).
fn load_stl(path: &Path) -> MeshResult<SourceMesh> {
    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let stl = stl_io::read_stl(&mut reader).map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    debug!(
        "STL contains {} vertices, {} triangles",
        stl.vertices.len(),
        stl.faces.len()
    );

    let points = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64))
        .collect();
    let facets = stl
        .faces
        .iter()
        .map(|face| face.vertices.map(|i| i as u32))
        .collect();

    Ok(SourceMesh::new(points, facets))
}

/// Load an OBJ file, triangulated, all models merged.
fn load_obj(path: &Path) -> MeshResult<SourceMesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    if models.is_empty() {
        return Err(MeshError::empty_mesh("OBJ file contains no models"));
    }

    let mut mesh = SourceMesh::default();
    for model in &models {
        debug!("OBJ model '{}': loading", model.name);
        let offset = mesh.points.len() as u32;

        mesh.points.extend(
            model
                .mesh
                .positions
                .chunks_exact(3)
                .map(|c| Point3::new(c[0] as f64, c[1] as f64, c[2] as f64)),
        );
        mesh.facets.extend(
            model
                .mesh
                .indices
                .chunks_exact(3)
                .map(|c| [c[0] + offset, c[1] + offset, c[2] + offset]),
        );
    }

    debug!(
        "OBJ loaded: {} points, {} facets from {} models",
        mesh.point_count(),
        mesh.facet_count(),
        models.len()
    );
    Ok(mesh)
}

/// Material referenced by an exported OBJ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    /// Name used by `usemtl` and `newmtl`.
    pub name: String,
    /// MTL body written after the `newmtl` line. Without it, no MTL file is
    /// written and the OBJ only references the material by name.
    pub content: Option<String>,
}

/// Options for [`write_objfile`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObjExportOptions {
    pub material: Option<Material>,
    /// Where to write the MTL file. Must be in the OBJ file's directory.
    /// Without it, a temporary `_*.mtl` file is created there.
    pub mtl_path: Option<PathBuf>,
    /// Write `vn` lines when the mesh has vertex normals (default: true).
    pub write_normals: bool,
    /// Applied to UV coordinates as they are written.
    pub uv_transform: UvTransform,
}

impl Default for ObjExportOptions {
    fn default() -> Self {
        Self {
            material: None,
            mtl_path: None,
            write_normals: true,
            uv_transform: UvTransform::identity(),
        }
    }
}

impl ObjExportOptions {
    pub fn with_material(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.material = Some(Material {
            name: name.into(),
            content: Some(content.into()),
        });
        self
    }

    /// Reference a material defined elsewhere.
    pub fn with_material_name(mut self, name: impl Into<String>) -> Self {
        self.material = Some(Material {
            name: name.into(),
            content: None,
        });
        self
    }

    pub fn with_mtl_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mtl_path = Some(path.into());
        self
    }

    pub fn with_normals(mut self, write_normals: bool) -> Self {
        self.write_normals = write_normals;
        self
    }

    pub fn with_uv_transform(mut self, transform: UvTransform) -> Self {
        self.uv_transform = transform;
        self
    }
}

/// Corner format of `f` lines, from what the file actually contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceMask {
    /// ` i/i/i`
    UvNormal,
    /// ` i/i`
    Uv,
    /// ` i//i`
    Normal,
    /// ` i`
    Plain,
}

impl FaceMask {
    pub fn new(has_uv: bool, has_normals: bool) -> Self {
        match (has_uv, has_normals) {
            (true, true) => FaceMask::UvNormal,
            (true, false) => FaceMask::Uv,
            (false, true) => FaceMask::Normal,
            (false, false) => FaceMask::Plain,
        }
    }

    fn write_corner(self, out: &mut String, index: u32) {
        let _ = match self {
            FaceMask::UvNormal => write!(out, " {index}/{index}/{index}"),
            FaceMask::Uv => write!(out, " {index}/{index}"),
            FaceMask::Normal => write!(out, " {index}//{index}"),
            FaceMask::Plain => write!(out, " {index}"),
        };
    }
}

/// Files produced by [`write_objfile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjExport {
    pub obj_path: PathBuf,
    pub mtl_path: Option<PathBuf>,
}

/// Write `mesh` as an OBJ file named `name`, plus its MTL file if the
/// options carry material content.
///
/// With no `path`, a temporary `_*.obj` file is created and kept. The MTL
/// location is checked before anything is written, and the MTL file is
/// written before the OBJ file is created.
///
/// # Errors
///
/// - [`MeshError::MaterialDirectoryMismatch`] if `options.mtl_path` is not in
///   the OBJ file's directory
/// - [`MeshError::IoWrite`] on any write failure
pub fn write_objfile(
    mesh: &RenderMesh,
    name: &str,
    path: Option<&Path>,
    options: &ObjExportOptions,
) -> MeshResult<ObjExport> {
    let _timer = OperationTimer::with_context("write_obj", mesh.count_facets(), mesh.count_points());

    let obj_dir = match path {
        Some(path) => parent_dir(path),
        None => std::env::temp_dir(),
    };
    let mtl_content = options
        .material
        .as_ref()
        .and_then(|m| m.content.as_deref().map(|content| (m.name.as_str(), content)));
    if let (Some(_), Some(mtl_path)) = (mtl_content, &options.mtl_path) {
        if parent_dir(mtl_path) != obj_dir {
            let obj_path = path.map_or_else(|| obj_dir.clone(), Path::to_path_buf);
            warn!(obj = %obj_path.display(), mtl = %mtl_path.display(), "OBJ and MTL directories differ");
            return Err(MeshError::material_directory_mismatch(obj_path, mtl_path));
        }
    }

    let mtl_path = match mtl_content {
        Some((mtl_name, content)) => Some(write_mtl_in(
            mtl_name,
            content,
            options.mtl_path.as_deref(),
            &obj_dir,
        )?),
        None => None,
    };

    let (file, obj_path) = match path {
        Some(path) => (
            File::create(path).map_err(|e| MeshError::io_write(path, e))?,
            path.to_path_buf(),
        ),
        None => create_temp_file(&obj_dir, ".obj")?,
    };

    let mtllib = mtl_path
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());

    let executor = Executor::for_mesh(mesh.params(), mesh.count_points());
    let mut writer = BufWriter::new(file);
    let written = write_obj_to(mesh, name, mtllib.as_deref(), options, &executor, &mut writer)
        .and_then(|()| writer.flush().map_err(|e| MeshError::io_write(&obj_path, e)));
    log_io_operation("write_obj", &obj_path, Some("obj"), written.is_ok());
    written?;

    Ok(ObjExport { obj_path, mtl_path })
}

/// Serialize `mesh` in OBJ format to `writer`.
///
/// Line blocks are formatted in chunks on the executor's pool, then written
/// in order, so the output does not depend on the execution mode.
pub fn write_obj_to<W: Write>(
    mesh: &RenderMesh,
    name: &str,
    mtllib: Option<&str>,
    options: &ObjExportOptions,
    executor: &Executor,
    writer: &mut W,
) -> MeshResult<()> {
    let uvmap = mesh.uvtransform(&options.uv_transform);
    let vnormals = mesh.vnormals().filter(|_| options.write_normals);
    let mask = FaceMask::new(uvmap.is_some(), vnormals.is_some());

    let mut blocks: Vec<String> = Vec::new();
    let mut header = String::from("# Written by render-mesh\n");
    if let Some(mtllib) = mtllib {
        let _ = write!(header, "mtllib {mtllib}\n\n");
    }
    blocks.push(header);

    blocks.push("# Vertices\n".to_string());
    blocks.extend(format_lines(executor, "obj vertices", mesh.points(), |out, p| {
        let _ = writeln!(out, "v {} {} {}", p.x, p.y, p.z);
    })?);
    blocks.push("\n".to_string());

    if let Some(uvmap) = &uvmap {
        blocks.push("# Texture coordinates\n".to_string());
        blocks.extend(format_lines(executor, "obj uvs", uvmap, |out, uv| {
            let _ = writeln!(out, "vt {} {}", uv.x, uv.y);
        })?);
        blocks.push("\n".to_string());
    }

    if let Some(vnormals) = vnormals {
        blocks.push("# Vertex normals\n".to_string());
        blocks.extend(format_lines(executor, "obj normals", vnormals, |out, n| {
            let _ = writeln!(out, "vn {} {} {}", n.x, n.y, n.z);
        })?);
        blocks.push("\n".to_string());
    }

    let mut object = format!("o {name}\n");
    if let Some(material) = &options.material {
        let _ = writeln!(object, "usemtl {}", material.name);
    }
    object.push('\n');
    blocks.push(object);

    blocks.push("# Faces\n".to_string());
    blocks.extend(format_lines(executor, "obj faces", mesh.facets(), |out, facet| {
        out.push('f');
        for &index in facet {
            mask.write_corner(out, index + 1);
        }
        out.push('\n');
    })?);

    for block in &blocks {
        writer
            .write_all(block.as_bytes())
            .map_err(|e| MeshError::io_write(name, e))?;
    }
    Ok(())
}

/// Format `items` into one string per chunk.
fn format_lines<T, F>(
    executor: &Executor,
    stage: &'static str,
    items: &[T],
    format_item: F,
) -> MeshResult<Vec<String>>
where
    T: Sync,
    F: Fn(&mut String, &T) + Send + Sync,
{
    let ranges = chunk_ranges(items.len(), executor.chunk_len(items.len()));
    executor.map_ranges(stage, &ranges, |_, range| {
        let mut out = String::with_capacity(range.len() * 40);
        for item in &items[range] {
            format_item(&mut out, item);
        }
        Ok(out)
    })
}

/// Write a material file: `newmtl <name>` followed by `content` verbatim.
///
/// With no `path`, a temporary `_*.mtl` file is created and kept. Returns
/// the path written.
pub fn write_mtl(name: &str, content: &str, path: Option<&Path>) -> MeshResult<PathBuf> {
    write_mtl_in(name, content, path, &std::env::temp_dir())
}

fn write_mtl_in(
    name: &str,
    content: &str,
    path: Option<&Path>,
    default_dir: &Path,
) -> MeshResult<PathBuf> {
    let (file, mtl_path) = match path {
        Some(path) => (
            File::create(path).map_err(|e| MeshError::io_write(path, e))?,
            path.to_path_buf(),
        ),
        None => create_temp_file(default_dir, ".mtl")?,
    };

    let mut writer = BufWriter::new(file);
    write!(writer, "newmtl {name}\n{content}")
        .and_then(|()| writer.flush())
        .map_err(|e| MeshError::io_write(&mtl_path, e))?;
    log_io_operation("write_mtl", &mtl_path, Some("mtl"), true);
    Ok(mtl_path)
}

/// Create and keep a `_*<suffix>` file in `dir`.
fn create_temp_file(dir: &Path, suffix: &str) -> MeshResult<(File, PathBuf)> {
    tempfile::Builder::new()
        .prefix("_")
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| MeshError::io_write(dir, e))?
        .keep()
        .map_err(|e| MeshError::io_write(dir, e.error))
}

/// Directory part of `path`; `.` for a bare file name.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{RenderMeshParams, UvProjection};
    use crate::test_meshes::unit_cube;
    use crate::transform::Transformation;
    use tempfile::{NamedTempFile, TempDir};

    fn cube_mesh(params: &RenderMeshParams) -> RenderMesh {
        let cube = unit_cube();
        RenderMesh::new(
            SourceMesh::new(cube.points, cube.facets),
            Transformation::identity(),
            params,
        )
        .unwrap()
    }

    fn obj_text(mesh: &RenderMesh, options: &ObjExportOptions) -> String {
        let mut out = Vec::new();
        write_obj_to(mesh, "cube", None, options, &Executor::sequential(16), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn create_test_stl() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();
        writeln!(file, "solid test").unwrap();
        writeln!(file, "  facet normal 0 0 1").unwrap();
        writeln!(file, "    outer loop").unwrap();
        writeln!(file, "      vertex 0 0 0").unwrap();
        writeln!(file, "      vertex 100 0 0").unwrap();
        writeln!(file, "      vertex 0 100 0").unwrap();
        writeln!(file, "    endloop").unwrap();
        writeln!(file, "  endfacet").unwrap();
        writeln!(file, "endsolid test").unwrap();
        file
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(MeshFormat::from_path(Path::new("a.STL")), Some(MeshFormat::Stl));
        assert_eq!(MeshFormat::from_path(Path::new("a.obj")), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_path(Path::new("a.ply")), None);
        assert!(matches!(
            load_mesh(Path::new("a.xyz")),
            Err(MeshError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_load_stl() {
        let file = create_test_stl();
        let mesh = load_mesh(file.path()).unwrap();
        assert_eq!(mesh.point_count(), 3);
        assert_eq!(mesh.facet_count(), 1);
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(100.0, 100.0, 0.0));
    }

    #[test]
    fn test_written_obj_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cube.obj");
        let mesh = cube_mesh(&RenderMeshParams::default());
        mesh.write_objfile("cube", Some(path.as_path()), &ObjExportOptions::default())
            .unwrap();

        let reloaded = load_mesh(&path).unwrap();
        assert_eq!(reloaded.point_count(), mesh.count_points());
        assert_eq!(reloaded.facets, mesh.facets());
    }

    #[test]
    fn test_layout_and_masks() {
        let smooth = cube_mesh(&RenderMeshParams::default());
        let text = obj_text(&smooth, &ObjExportOptions::default());
        assert!(text.starts_with("# Written by render-mesh\n# Vertices\nv "));
        assert!(text.contains("\n# Vertex normals\nvn "));
        assert!(!text.contains("# Texture coordinates"));
        assert!(text.contains("\no cube\n\n# Faces\nf 1//1 2//2 3//3\n"));

        let plain = obj_text(&smooth, &ObjExportOptions::default().with_normals(false));
        assert!(!plain.contains("vn "));
        assert!(plain.contains("\nf 1 2 3\n"));

        let textured = cube_mesh(&RenderMeshParams::with_uv(UvProjection::Cube));
        let full = obj_text(&textured, &ObjExportOptions::default());
        assert!(full.contains("\n# Texture coordinates\nvt "));
        assert!(full.contains("\nf 1/1/1 2/2/2 3/3/3\n"));

        let uv_only = obj_text(&textured, &ObjExportOptions::default().with_normals(false));
        assert!(uv_only.contains("\nf 1/1 2/2 3/3\n"));
    }

    #[test]
    fn test_parallel_formatting_is_byte_identical() {
        let mesh = cube_mesh(&RenderMeshParams::with_uv(UvProjection::Cube));
        let options = ObjExportOptions::default().with_material_name("steel");
        let mut sequential = Vec::new();
        write_obj_to(&mesh, "cube", Some("a.mtl"), &options, &Executor::sequential(16), &mut sequential)
            .unwrap();
        let mut parallel = Vec::new();
        write_obj_to(&mesh, "cube", Some("a.mtl"), &options, &Executor::with_workers(3, 5), &mut parallel)
            .unwrap();
        assert_eq!(sequential, parallel);

        let text = String::from_utf8(sequential).unwrap();
        assert!(text.starts_with("# Written by render-mesh\nmtllib a.mtl\n\n# Vertices\n"));
        assert!(text.contains("\no cube\nusemtl steel\n\n"));
    }

    #[test]
    fn test_material_written_next_to_obj() {
        let dir = TempDir::new().unwrap();
        let obj = dir.path().join("cube.obj");
        let mesh = cube_mesh(&RenderMeshParams::default());
        let options = ObjExportOptions::default().with_material("paint", "Kd 1 0 0\n");
        let export = mesh.write_objfile("cube", Some(obj.as_path()), &options).unwrap();

        let mtl = export.mtl_path.unwrap();
        assert_eq!(mtl.parent(), Some(dir.path()));
        assert_eq!(std::fs::read_to_string(&mtl).unwrap(), "newmtl paint\nKd 1 0 0\n");
        let text = std::fs::read_to_string(&obj).unwrap();
        let basename = mtl.file_name().unwrap().to_string_lossy().into_owned();
        assert!(text.contains(&format!("mtllib {basename}\n")));
    }

    #[test]
    fn test_material_directory_mismatch_writes_nothing() {
        let obj_dir = TempDir::new().unwrap();
        let mtl_dir = TempDir::new().unwrap();
        let obj = obj_dir.path().join("cube.obj");
        let mtl = mtl_dir.path().join("cube.mtl");
        let mesh = cube_mesh(&RenderMeshParams::default());
        let options = ObjExportOptions::default()
            .with_material("paint", "Kd 1 0 0\n")
            .with_mtl_path(&mtl);

        let err = mesh.write_objfile("cube", Some(obj.as_path()), &options).unwrap_err();
        assert!(matches!(err, MeshError::MaterialDirectoryMismatch { .. }));
        assert!(!obj.exists());
        assert!(!mtl.exists());
    }

    #[test]
    fn test_failed_material_write_leaves_no_obj() {
        let dir = TempDir::new().unwrap();
        let obj = dir.path().join("cube.obj");
        // A directory where the MTL file should go makes its creation fail.
        let mtl = dir.path().join("cube.mtl");
        std::fs::create_dir(&mtl).unwrap();
        let mesh = cube_mesh(&RenderMeshParams::default());
        let options = ObjExportOptions::default()
            .with_material("paint", "Kd 1 0 0\n")
            .with_mtl_path(&mtl);

        let err = mesh.write_objfile("cube", Some(obj.as_path()), &options).unwrap_err();
        assert!(matches!(err, MeshError::IoWrite { .. }));
        assert!(!obj.exists());
    }

    #[test]
    fn test_temporary_obj() {
        let mesh = cube_mesh(&RenderMeshParams::default());
        let export = mesh
            .write_objfile("cube", None, &ObjExportOptions::default())
            .unwrap();
        let file_name = export.obj_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with('_') && file_name.ends_with(".obj"));
        assert!(export.obj_path.exists());
        std::fs::remove_file(&export.obj_path).unwrap();
    }

    #[test]
    fn test_write_mtl_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.mtl");
        let written = write_mtl("m", "Ns 10\n", Some(path.as_path())).unwrap();
        assert_eq!(written, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "newmtl m\nNs 10\n");
    }
}
