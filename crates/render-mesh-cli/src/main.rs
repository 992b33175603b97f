//! render-mesh: command-line front end for render-ready mesh processing.
//!
//! Loads STL or OBJ meshes, applies a UV projection, splits hard edges,
//! computes vertex normals and writes OBJ/MTL files for renderers.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=render_mesh=info` - Basic operation logging
//! - `RUST_LOG=render_mesh=debug` - Detailed stage logging
//! - `RUST_LOG=render_mesh::timing=debug` - Performance timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Cube-mapped UVs, 40° hard edges, with a material
//! render-mesh process part.stl -o part.obj --projection cube --split-angle 40 \
//!     --material paint --material-file paint.mtl
//!
//! # Parameters from a file, JSON summary
//! render-mesh --format json process scan.obj --config render.toml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use render_mesh::UvProjection;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::process::ProcessArgs;
use commands::{info, process};

/// render-mesh - Prepare triangle meshes for rendering.
///
/// Project UVs, split hard edges and compute smooth vertex normals, then
/// export OBJ/MTL files.
#[derive(Parser)]
#[command(name = "render-mesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Projection {
    /// No UV coordinates
    None,
    /// Six planar projections along the dominant normal axis
    Cube,
    /// Latitude/longitude around the center of gravity
    Sphere,
    /// Around the z axis, with planar caps
    Cylinder,
}

impl From<Projection> for UvProjection {
    fn from(projection: Projection) -> Self {
        match projection {
            Projection::None => UvProjection::None,
            Projection::Cube => UvProjection::Cube,
            Projection::Sphere => UvProjection::Sphere,
            Projection::Cylinder => UvProjection::Cylinder,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh statistics and information
    Info {
        /// Input mesh file
        input: PathBuf,

        /// Also report smooth components at this split angle (degrees)
        #[arg(long)]
        split_angle: Option<f64>,
    },

    /// Build a render mesh and write it as OBJ
    Process {
        /// Input mesh file (STL or OBJ)
        input: PathBuf,

        /// Output OBJ path (a temporary file when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Parameter file (TOML or JSON); flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// UV projection
        #[arg(long, short)]
        projection: Option<Projection>,

        /// Hard edge angle in degrees
        #[arg(long)]
        split_angle: Option<f64>,

        /// Keep the geometry as loaded: no splitting, no vertex normals
        #[arg(long)]
        no_autosmooth: bool,

        /// Scale from model units to UV units
        #[arg(long)]
        uv_unit_scale: Option<f64>,

        /// Disable parallel processing
        #[arg(long)]
        sequential: bool,

        /// Number of worker threads
        #[arg(long, conflicts_with = "sequential")]
        workers: Option<usize>,

        /// Material name for `usemtl`
        #[arg(long)]
        material: Option<String>,

        /// MTL statements for the material; writes an MTL file
        #[arg(long, requires = "material")]
        material_file: Option<PathBuf>,

        /// MTL output path, in the same directory as the OBJ file
        #[arg(long, requires = "material_file")]
        mtl_output: Option<PathBuf>,

        /// Do not write vertex normals
        #[arg(long)]
        no_normals: bool,

        /// UV translation applied on export
        #[arg(long, num_args = 2, value_names = ["U", "V"], allow_negative_numbers = true)]
        uv_translate: Option<Vec<f64>>,

        /// UV rotation in degrees applied on export
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        uv_rotate: f64,

        /// UV scale applied on export
        #[arg(long, default_value = "1.0")]
        uv_scale: f64,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "render_mesh=info",
            2 => "render_mesh=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    // Install miette's panic hook for better error display
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Info { input, split_angle } => info::run(input, *split_angle, &cli),
        Commands::Process {
            input,
            output,
            config,
            projection,
            split_angle,
            no_autosmooth,
            uv_unit_scale,
            sequential,
            workers,
            material,
            material_file,
            mtl_output,
            no_normals,
            uv_translate,
            uv_rotate,
            uv_scale,
        } => {
            let args = ProcessArgs {
                input,
                output: output.as_deref(),
                config: config.as_deref(),
                projection: *projection,
                split_angle: *split_angle,
                no_autosmooth: *no_autosmooth,
                uv_unit_scale: *uv_unit_scale,
                sequential: *sequential,
                workers: *workers,
                material: material.as_deref(),
                material_file: material_file.as_deref(),
                mtl_output: mtl_output.as_deref(),
                no_normals: *no_normals,
                uv_translate: uv_translate.as_deref().and_then(|uv| match uv {
                    [u, v] => Some([*u, *v]),
                    _ => None,
                }),
                uv_rotate: *uv_rotate,
                uv_scale: *uv_scale,
            };
            process::run(&args, &cli)
        }
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(mesh_err) = e.downcast_ref::<render_mesh::MeshError>() {
                eprintln!("{}: {}", "Error".red().bold(), mesh_err);
                eprintln!("  {}: {}", "Code".cyan(), mesh_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    mesh_err.recovery_suggestion()
                );
                if let Some(location) = mesh_err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
