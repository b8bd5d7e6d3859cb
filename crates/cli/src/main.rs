use clap::Parser;
use clap::Subcommand;
use eyre::eyre;
use std::path::PathBuf;
use std::sync::Arc;
use terravigil_client::projection::{summarize_analysis, summarize_boundary, summarize_elevation};
use terravigil_client::types::AnalysisResult;
use terravigil_client::{AnalysisService, ClientConfig, HttpAnalysisService};
use terravigil_cli::{DemChoice, DetectRequest};
use tracing_subscriber::{filter::LevelFilter, fmt::format::FmtSpan, EnvFilter};

#[derive(Parser, Debug)]
#[clap(author = "TerraVigil Team", version, about, long_about = None)]
pub struct ArgConfiguration {
    #[command(flatten)]
    client: ClientConfig,
    #[command(subcommand)]
    command: ConfCommands,
}

#[derive(Subcommand, Debug)]
enum ConfCommands {
    /// Check that the analysis service answers.
    Health,

    /// Print the sample detection result.
    Sample {
        /// Fetch the sample from the service instead of using the built-in one.
        #[clap(long)]
        remote: bool,
    },

    /// Detect mining in a satellite image, optionally followed by a boundary
    /// check, volume estimation and a compliance report.
    #[command(arg_required_else_help = true)]
    Detect {
        /// Satellite image to analyse (GeoTIFF).
        #[clap(short, long, value_name = "IMAGE FILE")]
        image: PathBuf,
        /// DEM file used to estimate the excavated volume.
        #[clap(long, value_name = "DEM FILE", conflicts_with = "auto_dem")]
        dem: Option<PathBuf>,
        /// Let the service fetch the DEM itself (see --dem-source).
        #[clap(long)]
        auto_dem: bool,
        /// Lease boundary (GeoJSON or zipped shapefile) to check the footprint against.
        #[clap(short, long, value_name = "BOUNDARY FILE")]
        boundary: Option<PathBuf>,
        /// Write a plain text compliance report to this file.
        #[clap(short, long, value_name = "REPORT FILE")]
        report: Option<PathBuf>,
    },

    /// Print the status of a submitted task.
    #[command(arg_required_else_help = true)]
    Status { task_id: String },

    /// Build the 3D terrain mesh of a DEM stored as JSON.
    #[command(arg_required_else_help = true)]
    Terrain {
        /// Volume estimation response or bare elevation grid.
        #[clap(long, value_name = "DEM JSON FILE")]
        dem_json: PathBuf,
        /// Write the mesh as JSON to this file.
        #[clap(short, long, value_name = "MESH FILE")]
        output: Option<PathBuf>,
    },
}

fn start_logger(default_level: LevelFilter) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        _ => EnvFilter::default().add_directive(default_level.into()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Progress bars carry the run; keep the log quiet unless asked.
    start_logger(LevelFilter::WARN);

    let args = ArgConfiguration::parse();
    let service: Arc<dyn AnalysisService> = Arc::new(HttpAnalysisService::from_config(&args.client)?);

    let outcome = match args.command {
        ConfCommands::Health => match terravigil_cli::run_health_command(service.as_ref()).await {
            Ok(health) => {
                println!(
                    "Analysis service is {}. {}",
                    health.status.as_deref().unwrap_or("up"),
                    health.message.as_deref().unwrap_or("")
                );
                Ok(())
            }
            Err(err) => Err(err),
        },
        ConfCommands::Sample { remote } => {
            match terravigil_cli::run_sample_command(service.as_ref(), remote).await {
                Ok(result) => {
                    print_analysis(&result);
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        ConfCommands::Detect {
            image,
            dem,
            auto_dem,
            boundary,
            report,
        } => {
            let dem = match (dem, auto_dem) {
                (Some(path), _) => Some(DemChoice::File(path)),
                (None, true) => Some(DemChoice::Auto(args.client.dem_source.clone())),
                (None, false) => None,
            };
            let request = DetectRequest {
                image,
                dem,
                boundary,
                report,
            };
            match terravigil_cli::run_detect_command(service, args.client.poll_config(), request)
                .await
            {
                Ok(outcome) => {
                    print_analysis(&outcome.analysis);
                    if let Some(boundary) = &outcome.boundary {
                        let summary = summarize_boundary(Some(boundary));
                        println!("Inside lease:     {}", summary.legal_area);
                        println!("Outside lease:    {} ({})", summary.illegal_area, summary.illegal_share);
                    }
                    if let Some(elevation) = &outcome.elevation {
                        let summary = summarize_elevation(Some(elevation));
                        println!("Volume:           {}", summary.volume);
                        println!("Max depth:        {}", summary.max_depth);
                        println!("Average depth:    {}", summary.avg_depth);
                        println!("Baseline:         {}", summary.baseline);
                        println!("DEM grid:         {}", summary.grid);
                    }
                    if let Some(report) = &outcome.report {
                        println!("Report written to {}", report.display());
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        ConfCommands::Status { task_id } => {
            match terravigil_cli::run_status_command(service.as_ref(), task_id).await {
                Ok(snapshot) => {
                    println!("Status: {} ({}%)", snapshot.status, snapshot.progress);
                    if let Some(error) = &snapshot.error {
                        println!("Error: {error}");
                    }
                    if let Some(result) = &snapshot.result {
                        print_analysis(result);
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        ConfCommands::Terrain { dem_json, output } => {
            match terravigil_cli::run_terrain_command(&dem_json, output.as_deref()).await {
                Ok(mesh) => {
                    let kind = if mesh.procedural { "procedural" } else { "DEM" };
                    println!(
                        "{kind} terrain: {}×{} vertices, {} triangles",
                        mesh.rows,
                        mesh.cols,
                        mesh.triangle_count()
                    );
                    if let Some((low, high)) = mesh.height_range() {
                        println!("Height range: {low:.2} .. {high:.2}");
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
    };

    outcome.map_err(|err| eyre!("{err}"))
}

fn print_analysis(result: &AnalysisResult) {
    let summary = summarize_analysis(Some(result));
    println!("Detected area:    {} ({})", summary.area, summary.area_km2);
    println!("Mining sites:     {}", summary.feature_count);
    println!("Mask:             {}", summary.mask_shape);
}
