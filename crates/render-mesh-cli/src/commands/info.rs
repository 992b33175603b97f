//! render-mesh info command - display mesh statistics.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use render_mesh::{RenderMesh, RenderMeshParams, Transformation, load_mesh, mesh_report};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    points: usize,
    facets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    surface_area: f64,
    degenerate_facets: usize,
    unreferenced_points: usize,
    boundary_edges: usize,
    non_manifold_edges: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    smoothing: Option<SmoothingInfo>,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

#[derive(Serialize)]
struct SmoothingInfo {
    split_angle_deg: f64,
    components: usize,
    largest_component: usize,
    points_after_split: usize,
}

pub fn run(input: &Path, split_angle: Option<f64>, cli: &Cli) -> Result<()> {
    let source =
        load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let report = mesh_report(&source);

    let bounds = report.bounds.map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });

    // Dry-run autosmooth to report how the mesh would split.
    let smoothing = match split_angle {
        Some(degrees) => {
            let params = RenderMeshParams::default().with_split_angle_deg(degrees);
            let mesh = RenderMesh::new(source, Transformation::identity(), &params)
                .with_context(|| "Autosmooth failed")?;
            mesh.components().map(|analysis| SmoothingInfo {
                split_angle_deg: degrees,
                components: analysis.component_count,
                largest_component: analysis.largest_component_size,
                points_after_split: mesh.count_points(),
            })
        }
        None => None,
    };

    let info = MeshInfo {
        path: input.display().to_string(),
        points: report.point_count,
        facets: report.facet_count,
        bounds,
        surface_area: report.surface_area,
        degenerate_facets: report.degenerate_facet_count,
        unreferenced_points: report.unreferenced_point_count,
        boundary_edges: report.boundary_edge_count,
        non_manifold_edges: report.non_manifold_edge_count,
        smoothing,
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&info, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Mesh Information".bold().underline());
                println!("  {}: {}", "File".cyan(), input.display());
                println!("  {}: {}", "Points".cyan(), info.points);
                println!("  {}: {}", "Facets".cyan(), info.facets);

                if let Some(ref b) = info.bounds {
                    println!(
                        "  {}: {:.3} x {:.3} x {:.3}",
                        "Dimensions".cyan(),
                        b.dimensions[0],
                        b.dimensions[1],
                        b.dimensions[2]
                    );
                    println!(
                        "  {}: ({:.3}, {:.3}, {:.3})",
                        "Min bounds".cyan(),
                        b.min[0],
                        b.min[1],
                        b.min[2]
                    );
                    println!(
                        "  {}: ({:.3}, {:.3}, {:.3})",
                        "Max bounds".cyan(),
                        b.max[0],
                        b.max[1],
                        b.max[2]
                    );
                }
                println!("  {}: {:.3}", "Surface area".cyan(), info.surface_area);

                let closed = if report.is_closed() {
                    "closed".green()
                } else {
                    format!("open ({} boundary edges)", info.boundary_edges).yellow()
                };
                println!("  {}: {}", "Topology".cyan(), closed);
                if !report.is_manifold() {
                    println!(
                        "  {}: {} non-manifold edges",
                        "Warning".yellow(),
                        info.non_manifold_edges
                    );
                }
                if info.degenerate_facets > 0 {
                    println!(
                        "  {}: {} zero-area facets",
                        "Warning".yellow(),
                        info.degenerate_facets
                    );
                }

                if let Some(ref s) = info.smoothing {
                    println!(
                        "  {}: {} components at {:.1}° ({} points after split, largest {} facets)",
                        "Smoothing".cyan(),
                        s.components,
                        s.split_angle_deg,
                        s.points_after_split,
                        s.largest_component
                    );
                }
            }
        }
    }

    Ok(())
}
