//! Roadbed CLI - shapes terrain under a road network.
//!
//! Reads road centerlines and a RAW heightmap, runs the shaping pipeline and writes the
//! adjusted heightmap, one paint mask per road material and a JSON dump of the network.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use roadbed::export::{
    export_heightmap_png, export_heightmap_raw, export_masks_png, export_network_json,
    import_heightmap_raw, PngExportOptions, RawFormat,
};
use roadbed::network::RoadInput;
use roadbed::pipeline::{
    CancellationToken, GenerationResult, Pipeline, RoadTerrain, StageConfig, StageOutcome,
};

/// Road network elevation harmonization and terrain write-back.
#[derive(Parser)]
#[command(name = "roadbed")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shape a heightmap under a road network.
    Shape {
        /// Road geometry as a JSON array of roads.
        #[arg(short, long)]
        roads: PathBuf,

        /// Input heightmap (headerless RAW).
        #[arg(long)]
        heightmap: PathBuf,

        /// Heightmap width in pixels.
        #[arg(long)]
        width: u32,

        /// Heightmap height in pixels.
        #[arg(long)]
        height: u32,

        /// Ground distance between adjacent pixels.
        #[arg(long, default_value = "1.0")]
        meters_per_pixel: f32,

        /// Sample format of the input heightmap.
        #[arg(long, default_value = "raw-float")]
        input_format: ExportFormat,

        /// Elevation of RAW16 value 0 (input and output).
        #[arg(long, default_value = "0.0")]
        min_height: f32,

        /// Elevation of RAW16 value 65535 (input and output).
        #[arg(long, default_value = "1000.0")]
        max_height: f32,

        /// JSON configuration file; missing fields take defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Named configuration preset, used when no file is given.
        #[arg(long)]
        preset: Option<Preset>,

        /// Override the maximum road grade (percent).
        #[arg(long)]
        max_grade: Option<f32>,

        /// Override the junction blend distance (meters).
        #[arg(long)]
        blend_distance: Option<f32>,

        /// Write bridge and tunnel profiles into the terrain instead of leaving gaps.
        #[arg(long)]
        keep_structures: bool,

        /// Output directory for generated files.
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Base name for output files.
        #[arg(short, long, default_value = "terrain")]
        name: String,

        /// Heightmap export format.
        #[arg(short, long, default_value = "png")]
        format: ExportFormat,
    },

    /// Print a configuration as JSON.
    Config {
        #[arg(long)]
        preset: Option<Preset>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    /// 16-bit PNG (universal compatibility).
    Png,
    /// 16-bit RAW little-endian (Unity).
    Raw,
    /// 32-bit float RAW (high precision).
    RawFloat,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Highway,
    Mountain,
    Urban,
}

impl Preset {
    fn config(self) -> StageConfig {
        match self {
            Preset::Highway => StageConfig::highway(),
            Preset::Mountain => StageConfig::mountain(),
            Preset::Urban => StageConfig::urban(),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Shape {
            roads,
            heightmap,
            width,
            height,
            meters_per_pixel,
            input_format,
            min_height,
            max_height,
            config,
            preset,
            max_grade,
            blend_distance,
            keep_structures,
            output,
            name,
            format,
        } => {
            let mut stage_config = load_config(config.as_deref(), preset);
            if let Some(grade) = max_grade {
                stage_config.elevation.max_grade_percent = grade;
            }
            if let Some(distance) = blend_distance {
                stage_config.elevation.blend_distance_meters = distance;
            }
            if keep_structures {
                stage_config.structures.exclude_structures = false;
            }
            let input = HeightmapInput {
                path: heightmap,
                width,
                height,
                meters_per_pixel,
                format: raw_format(input_format).unwrap_or_else(|| {
                    eprintln!("Error: input heightmap must be raw or raw-float");
                    std::process::exit(1);
                }),
                min_height,
                max_height,
            };
            run_shape(&roads, &input, stage_config, &output, &name, format);
        }
        Commands::Config { preset } => {
            let config = preset.map(Preset::config).unwrap_or_default();
            match serde_json::to_string_pretty(&config) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error encoding configuration: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

struct HeightmapInput {
    path: PathBuf,
    width: u32,
    height: u32,
    meters_per_pixel: f32,
    format: RawFormat,
    min_height: f32,
    max_height: f32,
}

fn raw_format(format: ExportFormat) -> Option<RawFormat> {
    match format {
        ExportFormat::Png => None,
        ExportFormat::Raw => Some(RawFormat::R16LittleEndian),
        ExportFormat::RawFloat => Some(RawFormat::R32Float),
    }
}

fn load_config(path: Option<&Path>, preset: Option<Preset>) -> StageConfig {
    let Some(path) = path else {
        return preset.map(Preset::config).unwrap_or_default();
    };
    if preset.is_some() {
        warn!("--preset is ignored when --config is given");
    }
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading config {}: {}", path.display(), e);
        std::process::exit(1);
    });
    serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("Error parsing config {}: {}", path.display(), e);
        std::process::exit(1);
    })
}

fn run_shape(
    roads_path: &Path,
    input: &HeightmapInput,
    config: StageConfig,
    output: &Path,
    name: &str,
    format: ExportFormat,
) {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let text = std::fs::read_to_string(roads_path).unwrap_or_else(|e| {
        eprintln!("Error reading roads {}: {}", roads_path.display(), e);
        std::process::exit(1);
    });
    let roads: Vec<RoadInput> = serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("Error parsing roads {}: {}", roads_path.display(), e);
        std::process::exit(1);
    });

    let grid = import_heightmap_raw(
        &input.path,
        input.width,
        input.height,
        input.meters_per_pixel,
        input.format,
        input.min_height,
        input.max_height,
    )
    .unwrap_or_else(|e| {
        eprintln!("Error reading heightmap {}: {}", input.path.display(), e);
        std::process::exit(1);
    });

    println!("Roadbed - Road Network Terrain Shaping");
    println!("======================================");
    println!("Roads: {}", roads.len());
    println!(
        "Heightmap: {}x{} at {} m/px",
        grid.width, grid.height, grid.meters_per_pixel
    );
    println!("Output: {}", output.display());

    let start = Instant::now();
    let mut terrain = RoadTerrain::with_cancellation(roads, grid, CancellationToken::new());
    let pipeline = Pipeline::standard(config);

    println!("\nRunning shaping pipeline...");
    let outcome = pipeline
        .run_with_callbacks(
            &mut terrain,
            |name, i, total| {
                println!("  [{}/{}] Starting: {}", i + 1, total, name);
            },
            |name, i, total| {
                println!("  [{}/{}] Completed: {}", i + 1, total, name);
            },
        )
        .unwrap_or_else(|e| {
            eprintln!("Error during shaping: {}", e);
            std::process::exit(1);
        });
    if let StageOutcome::Cancelled { stage, unprocessed } = &outcome {
        eprintln!("Shaping stopped at {} with {} items left", stage.name(), unprocessed.len());
        std::process::exit(1);
    }
    println!("Shaping completed in {:.2?}", start.elapsed());

    let warnings = terrain.warnings().count();
    let dropped = terrain.diagnostics.len() - warnings;
    info!(
        "{} edges, {} junctions, {} warnings, {} dropped roads",
        terrain.network.edges.len(),
        terrain.network.junctions.len(),
        warnings,
        dropped
    );

    println!("\nExporting...");
    let export_start = Instant::now();
    std::fs::create_dir_all(output).unwrap_or_else(|e| {
        eprintln!("Error creating output directory: {}", e);
        std::process::exit(1);
    });

    let (min_h, max_h) = terrain.heightmap.height_range();
    println!("Height range: [{:.2}, {:.2}] m", min_h, max_h);
    match format {
        ExportFormat::Png => {
            let path = output.join(format!("{}.png", name));
            let options = PngExportOptions::auto_range(&terrain.heightmap);
            export_heightmap_png(&terrain.heightmap, &path, &options).unwrap_or_else(|e| {
                eprintln!("Error exporting PNG: {}", e);
                std::process::exit(1);
            });
            println!("  Exported heightmap: {}", path.display());
        }
        ExportFormat::Raw | ExportFormat::RawFloat => {
            let raw = raw_format(format).unwrap_or_default();
            let path = output.join(format!("{}.raw", name));
            export_heightmap_raw(&terrain.heightmap, &path, raw, input.min_height, input.max_height)
                .unwrap_or_else(|e| {
                    eprintln!("Error exporting RAW: {}", e);
                    std::process::exit(1);
                });
            println!("  Exported heightmap ({:?}): {}", raw, path.display());
        }
    }

    let masks = export_masks_png(&terrain.masks, output, name).unwrap_or_else(|e| {
        eprintln!("Error exporting masks: {}", e);
        std::process::exit(1);
    });
    println!("  Exported {} paint masks: {}_*.png", masks.len(), name);

    let result = GenerationResult::new(terrain, outcome);
    let json = output.join(format!("{}_network.json", name));
    export_network_json(&result, &json).unwrap_or_else(|e| {
        eprintln!("Error exporting network: {}", e);
        std::process::exit(1);
    });
    println!("  Exported network: {}", json.display());

    println!("Export completed in {:.2?}", export_start.elapsed());
}
