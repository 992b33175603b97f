//! render-mesh process command - project UVs, autosmooth and export OBJ.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use nalgebra::Vector2;
use render_mesh::progress::{Progress, ProgressCallback};
use render_mesh::{
    ObjExportOptions, RenderMesh, RenderMeshParams, Transformation, UvTransform, load_mesh,
};
use serde::Serialize;

use crate::{Cli, OutputFormat, Projection, output};

#[derive(Serialize)]
struct ProcessResult {
    input: String,
    obj: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtl: Option<String>,
    projection: String,
    input_points: usize,
    input_facets: usize,
    output_points: usize,
    output_facets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    components: Option<usize>,
    has_uvmap: bool,
    has_vnormals: bool,
}

/// Options for the process command, as parsed from the command line.
pub struct ProcessArgs<'a> {
    pub input: &'a Path,
    pub output: Option<&'a Path>,
    pub config: Option<&'a Path>,
    pub projection: Option<Projection>,
    pub split_angle: Option<f64>,
    pub no_autosmooth: bool,
    pub uv_unit_scale: Option<f64>,
    pub sequential: bool,
    pub workers: Option<usize>,
    pub material: Option<&'a str>,
    pub material_file: Option<&'a Path>,
    pub mtl_output: Option<&'a Path>,
    pub no_normals: bool,
    pub uv_translate: Option<[f64; 2]>,
    pub uv_rotate: f64,
    pub uv_scale: f64,
}

pub fn run(args: &ProcessArgs<'_>, cli: &Cli) -> Result<()> {
    let mut params = match args.config {
        Some(path) => RenderMeshParams::load(path)
            .with_context(|| format!("Failed to load parameters from {:?}", path))?,
        None => RenderMeshParams::default(),
    };

    // Command-line flags override the config file
    if let Some(projection) = args.projection {
        params.uv_projection = projection.into();
    }
    if let Some(degrees) = args.split_angle {
        params = params.with_split_angle_deg(degrees);
    }
    if args.no_autosmooth {
        params.autosmooth = false;
    }
    if let Some(scale) = args.uv_unit_scale {
        params.uv_unit_scale = scale;
    }
    if args.sequential {
        params.enable_parallel = false;
    }
    if let Some(workers) = args.workers {
        params.worker_count = Some(workers);
    }

    output::info(
        &format!("Loading {}...", args.input.display()),
        cli.format,
        cli.quiet,
    );
    let source = load_mesh(args.input)
        .with_context(|| format!("Failed to load mesh from {:?}", args.input))?;
    let input_points = source.point_count();
    let input_facets = source.facet_count();

    let processed = if cli.quiet || matches!(cli.format, OutputFormat::Json) {
        RenderMesh::new(source, Transformation::identity(), &params)
    } else {
        let callback: ProgressCallback = Arc::new(|progress: &Progress| {
            eprintln!(
                "  [{:>3}%] {} ({:.0} ms)",
                progress.percent(),
                progress.message,
                progress.elapsed.as_secs_f64() * 1000.0
            );
        });
        RenderMesh::with_progress(source, Transformation::identity(), &params, callback)
    };
    let mesh = processed.with_context(|| "Processing failed")?;

    let mut options = ObjExportOptions::default()
        .with_normals(!args.no_normals)
        .with_uv_transform(UvTransform::new(
            args.uv_translate.map_or_else(Vector2::zeros, Vector2::from),
            args.uv_rotate,
            args.uv_scale,
        ));
    if let Some(name) = args.material {
        options = match args.material_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read material from {:?}", path))?;
                options.with_material(name, content)
            }
            None => options.with_material_name(name),
        };
    }
    if let Some(path) = args.mtl_output {
        options = options.with_mtl_path(path);
    }

    let name = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    let export = mesh
        .write_objfile(&name, args.output, &options)
        .with_context(|| "Failed to write OBJ file")?;

    let result = ProcessResult {
        input: args.input.display().to_string(),
        obj: export.obj_path.display().to_string(),
        mtl: export.mtl_path.as_deref().map(|p| p.display().to_string()),
        projection: params.uv_projection.to_string(),
        input_points,
        input_facets,
        output_points: mesh.count_points(),
        output_facets: mesh.count_facets(),
        components: mesh.components().map(|c| c.component_count),
        has_uvmap: mesh.has_uvmap(),
        has_vnormals: mesh.has_vnormals(),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&result, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("Render mesh written to {}", result.obj),
                    cli.format,
                    cli.quiet,
                );
                if let Some(ref mtl) = result.mtl {
                    println!("  {}: {}", "Material".cyan(), mtl);
                }
                println!(
                    "  {}: {} → {}",
                    "Points".cyan(),
                    result.input_points,
                    result.output_points
                );
                println!("  {}: {}", "Facets".cyan(), result.output_facets);
                println!("  {}: {}", "Projection".cyan(), result.projection);
                if let Some(components) = result.components {
                    println!("  {}: {}", "Smooth components".cyan(), components);
                }
            }
        }
    }

    Ok(())
}

