use clap::Parser;
use mcexplore::dimension::DimensionSpec;
use mcexplore::grid::{Extent, Unit, DEFAULT_FOOTPRINT};
use mcexplore::server::{ServerEngine, DEFAULT_COMMAND};
use mcexplore::signal::{install_signal_handlers, ShutdownSignal};
use mcexplore::{explore, ExploreError, ExploreOptions};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "mcexplore",
    version,
    about = "Use a Minecraft server to generate a rectangular section of the world"
)]
struct Cli {
    /// Size to generate along x, in chunks (or regions with -r)
    xsize: u32,
    /// Size to generate along z (default: XSIZE)
    zsize: Option<u32>,
    /// Command used to start the server
    #[arg(short, long, default_value = DEFAULT_COMMAND)]
    command: String,
    /// Dimension id and region folder to generate, as ID=FOLDER (folder relative to --path)
    #[arg(short, long, value_name = "ID=FOLDER")]
    dimension: Option<String>,
    /// Working directory of the server
    #[arg(short, long, default_value = ".")]
    path: PathBuf,
    /// Measure XSIZE and ZSIZE in regions (32x32 chunks) instead of chunks
    #[arg(short, long, default_value_t = false)]
    regions: bool,
    /// X coordinate to generate around (default: spawn)
    #[arg(short = 'x', allow_hyphen_values = true)]
    x_origin: Option<i32>,
    /// Z coordinate to generate around (default: spawn)
    #[arg(short = 'z', allow_hyphen_values = true)]
    z_origin: Option<i32>,
    /// Discard server output (default)
    #[arg(short, long, default_value_t = false, overrides_with = "verbose")]
    quiet: bool,
    /// Show server output
    #[arg(short, long, default_value_t = false, overrides_with = "quiet")]
    verbose: bool,
    /// Edge length in blocks of the area one server start generates
    #[arg(long, default_value_t = DEFAULT_FOOTPRINT)]
    footprint: i32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        exit_with_error(err);
    }
}

fn run(cli: Cli) -> Result<(), ExploreError> {
    let unit = if cli.regions { Unit::Region } else { Unit::Chunk };
    let extent = Extent {
        x_size: cli.xsize,
        z_size: cli.zsize.unwrap_or(cli.xsize),
        unit,
    };
    let dimension = cli
        .dimension
        .as_deref()
        .map(DimensionSpec::parse)
        .transpose()?;

    let mut options = ExploreOptions::new(&cli.path, extent);
    options.x_origin = cli.x_origin;
    options.z_origin = cli.z_origin;
    options.dimension = dimension;
    options.footprint = cli.footprint;

    let verbose = cli.verbose && !cli.quiet;
    let mut engine = ServerEngine::new(&cli.path, &cli.command, verbose)?;

    let shutdown = Arc::new(ShutdownSignal::new());
    install_signal_handlers(shutdown.clone())?;

    let report = explore(&options, &mut engine, &shutdown)?;
    let (width, height) = report.covered_blocks;
    log::info!(
        "Generated {width}x{height} blocks around {}, {} in {} server starts",
        report.snapped_origin.0,
        report.snapped_origin.1,
        report.cells
    );
    Ok(())
}

fn exit_with_error(err: ExploreError) -> ! {
    eprintln!("Error: {}", err);
    std::process::exit(1);
}
