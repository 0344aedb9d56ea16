//! One exploration run: preflight checks, then a spawn move and a server
//! restart per grid cell, with `level.dat` and the region folders always put
//! back afterwards.

use crate::backup::{scan_stale_artifacts, LevelBackup};
use crate::dimension::{same_location, DimensionSpec, RegionSwap};
use crate::error::ExploreError;
use crate::grid::{AnchorPoint, Extent, GridPlan, GridPlanner, DEFAULT_FOOTPRINT};
use crate::level::{apply_dimension_profile, read_dimensions, read_spawn, write_spawn, LevelError};
use crate::properties::{
    eula_accepted, level_name, read_properties, EULA, LEVEL_NAME, SERVER_PROPERTIES,
};
use crate::server::Engine;
use crate::signal::ShutdownSignal;
use log::{debug, error, info};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct ExploreOptions {
    pub server_dir: PathBuf,
    pub extent: Extent,
    pub x_origin: Option<i32>,
    pub z_origin: Option<i32>,
    /// `None` generates the overworld.
    pub dimension: Option<DimensionSpec>,
    pub footprint: i32,
}

impl ExploreOptions {
    pub fn new(server_dir: impl Into<PathBuf>, extent: Extent) -> Self {
        Self {
            server_dir: server_dir.into(),
            extent,
            x_origin: None,
            z_origin: None,
            dimension: None,
            footprint: DEFAULT_FOOTPRINT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExploreReport {
    pub original_spawn: AnchorPoint,
    pub snapped_origin: (i32, i32),
    pub cells: usize,
    pub covered_blocks: (i64, i64),
}

/// Paths settled by the preflight checks.
struct World {
    level: PathBuf,
    overworld_regions: PathBuf,
    dimension: DimensionSpec,
}

pub fn explore<E: Engine>(
    options: &ExploreOptions,
    engine: &mut E,
    shutdown: &ShutdownSignal,
) -> Result<ExploreReport, ExploreError> {
    let planner = GridPlanner::with_footprint(options.footprint)?;
    planner.validate(options.extent)?;
    if !options.server_dir.is_dir() {
        return Err(ExploreError::DirectoryNotFound(options.server_dir.clone()));
    }
    scan_stale_artifacts(&options.server_dir)?;

    let world = preflight(options, engine, shutdown)?;
    if !world.dimension.is_overworld() {
        let profiles = read_dimensions(&world.level)?;
        if !profiles.contains(&world.dimension.id) {
            return Err(LevelError::PartitionNotFound(world.dimension.id.clone()).into());
        }
        let target = world.dimension.region_dir(&options.server_dir);
        if !same_location(&world.overworld_regions, &target) {
            RegionSwap::check(&world.overworld_regions, &target)?;
        }
    }

    let original_spawn = read_spawn(&world.level)?;
    let origin = (
        options.x_origin.unwrap_or(original_spawn.x),
        options.z_origin.unwrap_or(original_spawn.z),
    );
    let plan = planner.plan(options.extent, origin)?;

    info!("Backing up level.dat with spawn of {original_spawn}:");
    let backup = LevelBackup::begin(&world.level)?;
    let result = run_swapped(options, engine, shutdown, &world, &plan);

    info!("Restoring level.dat with spawn of {original_spawn}:");
    let restored = backup.commit();
    first_error(result, restored)?;

    Ok(ExploreReport {
        original_spawn,
        snapped_origin: plan.snapped_origin(),
        cells: plan.len(),
        covered_blocks: plan.covered_blocks(),
    })
}

fn preflight<E: Engine>(
    options: &ExploreOptions,
    engine: &mut E,
    shutdown: &ShutdownSignal,
) -> Result<World, ExploreError> {
    let server_dir = &options.server_dir;
    let properties_path = server_dir.join(SERVER_PROPERTIES);
    let eula = server_dir.join(EULA);

    if !properties_path.is_file() {
        info!("Generating server files");
        run_engine(engine, shutdown)?;
    }
    require_eula(&eula)?;

    let mut properties = read_properties(&properties_path)?;
    if level_name(&properties).is_none() {
        // The server fills in missing properties with their defaults.
        info!("Generating server files");
        run_engine(engine, shutdown)?;
        properties = read_properties(&properties_path)?;
    }
    let name = level_name(&properties)
        .ok_or_else(|| ExploreError::MissingProperty {
            key: LEVEL_NAME.to_string(),
            path: properties_path.clone(),
        })?
        .to_string();

    let world_dir = server_dir.join(&name);
    let level = world_dir.join("level.dat");
    if !level.is_file() {
        info!("Generating server files");
        run_engine(engine, shutdown)?;
        require_eula(&eula)?;
    }
    if !level.is_file() {
        return Err(ExploreError::MissingPersistentState(level));
    }

    let dimension = options
        .dimension
        .clone()
        .unwrap_or_else(|| DimensionSpec::overworld(&name));
    Ok(World {
        level,
        overworld_regions: world_dir.join("region"),
        dimension,
    })
}

fn require_eula(eula: &Path) -> Result<(), ExploreError> {
    if eula_accepted(eula)? {
        Ok(())
    } else {
        Err(ExploreError::EulaNotAccepted(eula.to_path_buf()))
    }
}

fn run_swapped<E: Engine>(
    options: &ExploreOptions,
    engine: &mut E,
    shutdown: &ShutdownSignal,
    world: &World,
    plan: &GridPlan,
) -> Result<(), ExploreError> {
    let target = world.dimension.region_dir(&options.server_dir);
    let swap = if same_location(&world.overworld_regions, &target) {
        None
    } else {
        info!(
            "Moving {} region folder into place of the overworld:",
            world.dimension.id
        );
        RegionSwap::swap_in(&world.overworld_regions, &target)?
    };

    let result = generate(engine, shutdown, world, plan);

    let restored = match swap {
        Some(swap) => {
            info!("Restoring {} region folder:", world.dimension.id);
            swap.swap_out()
        }
        None => Ok(()),
    };
    first_error(result, restored)
}

fn generate<E: Engine>(
    engine: &mut E,
    shutdown: &ShutdownSignal,
    world: &World,
    plan: &GridPlan,
) -> Result<(), ExploreError> {
    if !world.dimension.is_overworld() {
        info!("Using {} generator settings", world.dimension.id);
        apply_dimension_profile(&world.level, &world.dimension.id)?;
    }

    let (x, z) = plan.snapped_origin();
    info!("Snapped origin to {x}, {z}");
    let (width, height) = plan.covered_blocks();
    info!("Size of area to generate: {width}x{height} blocks");

    for (cell, anchor) in plan.cells() {
        check_shutdown(shutdown)?;
        info!("Setting spawn to {}, {}", anchor.x, anchor.z);
        debug!("cell {}/{} of {} anchors", cell.column, cell.row, plan.len());
        write_spawn(&world.level, anchor)?;
        run_engine(engine, shutdown)?;
    }
    Ok(())
}

fn check_shutdown(shutdown: &ShutdownSignal) -> Result<(), ExploreError> {
    if shutdown.is_signaled() {
        Err(ExploreError::Interrupted(shutdown.signal_name()))
    } else {
        Ok(())
    }
}

/// A server killed by the same signal that interrupted us is reported as the
/// interruption, not as a server failure.
fn run_engine<E: Engine>(engine: &mut E, shutdown: &ShutdownSignal) -> Result<(), ExploreError> {
    check_shutdown(shutdown)?;
    engine.run_once().map_err(|error| {
        if shutdown.is_signaled() {
            debug!("server stopped after {}: {error}", shutdown.signal_name());
            ExploreError::Interrupted(shutdown.signal_name())
        } else {
            error
        }
    })
}

/// Keeps the run's own error ahead of any cleanup error.
fn first_error(
    result: Result<(), ExploreError>,
    cleanup: Result<(), ExploreError>,
) -> Result<(), ExploreError> {
    match (result, cleanup) {
        (Ok(()), cleanup) => cleanup,
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(cleanup)) => {
            error!("{cleanup}");
            Err(error)
        }
    }
}
