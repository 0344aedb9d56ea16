use crate::grid::Unit;
use crate::level::LevelError;
use crate::nbt::NbtError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExploreError {
    #[error(
        "{axis}size too small: {size} {unit}s ({blocks} blocks)\n\nThe area to generate must be larger than {footprint} blocks along each axis."
    )]
    InvalidExtent {
        axis: char,
        size: u32,
        unit: Unit,
        blocks: i64,
        footprint: i32,
    },

    #[error("footprint must be more than 16 blocks, got {0}")]
    InvalidFootprint(i32),

    #[error("{axis} coordinate {value} is outside the world")]
    CoordinateOutOfRange { axis: char, value: i64 },

    #[error(
        "backup already exists: {}\n\nEither mcexplore failed, was interrupted, or is still running. Inspect it and restore or delete it manually before running again.",
        .path.display()
    )]
    BackupAlreadyExists { path: PathBuf },

    #[error("file not found: {}", .0.display())]
    MissingPersistentState(PathBuf),

    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error(transparent)]
    Level(#[from] LevelError),

    #[error("command failed ({}): '{command}'{}", describe_exit(.code), log_hint(.log))]
    EngineFailure {
        command: String,
        code: Option<i32>,
        log: Option<PathBuf>,
    },

    #[error("you have not agreed to the Minecraft End User License Agreement: {}", .0.display())]
    EulaNotAccepted(PathBuf),

    #[error("property '{key}' is not defined: {}", .path.display())]
    MissingProperty { key: String, path: PathBuf },

    #[error("dimension not specified as 'id=folder': '{0}'")]
    InvalidDimension(String),

    #[error("cannot parse server command: '{0}'")]
    InvalidCommand(String),

    #[error("interrupted by {0}")]
    Interrupted(&'static str),

    #[error("cannot install handler for {name}: {source}")]
    SignalHandler {
        name: &'static str,
        source: io::Error,
    },

    #[error("failed to access {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl ExploreError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        ExploreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<NbtError> for ExploreError {
    fn from(error: NbtError) -> Self {
        ExploreError::Level(LevelError::Nbt(error))
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn log_hint(log: &Option<PathBuf>) -> String {
    match log {
        Some(path) => format!("\nCheck {} for errors", path.display()),
        None => String::new(),
    }
}
