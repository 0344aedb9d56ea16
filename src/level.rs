//! Typed access to the few `level.dat` fields the explorer touches.

use crate::grid::AnchorPoint;
use crate::nbt::{Compound, Document, NbtError, Tag};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

pub const OVERWORLD: &str = "minecraft:overworld";

const SPAWN_X: [&str; 2] = ["Data", "SpawnX"];
const SPAWN_Y: [&str; 2] = ["Data", "SpawnY"];
const SPAWN_Z: [&str; 2] = ["Data", "SpawnZ"];
const DIMENSIONS: [&str; 3] = ["Data", "WorldGenSettings", "dimensions"];

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("field not found in level.dat: {0}")]
    MissingField(String),

    #[error("value {value} does not fit the existing type of {field}")]
    FieldOutOfRange { field: String, value: i64 },

    #[error("dimension not defined in level.dat: '{0}'")]
    PartitionNotFound(String),

    #[error(transparent)]
    Nbt(#[from] NbtError),
}

fn field_name(path: &[&str]) -> String {
    path.join(".")
}

fn read_int(document: &Document, path: &[&str]) -> Result<i32, LevelError> {
    document
        .root
        .path(path)
        .and_then(Tag::as_i64)
        .and_then(|value| i32::try_from(value).ok())
        .ok_or_else(|| LevelError::MissingField(field_name(path)))
}

/// Overwrites an integer leaf while keeping its stored width.
fn write_int(document: &mut Document, path: &[&str], value: i32) -> Result<(), LevelError> {
    let out_of_range = || LevelError::FieldOutOfRange {
        field: field_name(path),
        value: i64::from(value),
    };
    let tag = document
        .root
        .path_mut(path)
        .ok_or_else(|| LevelError::MissingField(field_name(path)))?;
    *tag = match tag {
        Tag::Byte(_) => Tag::Byte(i8::try_from(value).map_err(|_| out_of_range())?),
        Tag::Short(_) => Tag::Short(i16::try_from(value).map_err(|_| out_of_range())?),
        Tag::Int(_) => Tag::Int(value),
        Tag::Long(_) => Tag::Long(i64::from(value)),
        _ => return Err(LevelError::MissingField(field_name(path))),
    };
    Ok(())
}

pub fn get_anchor(document: &Document) -> Result<AnchorPoint, LevelError> {
    Ok(AnchorPoint {
        x: read_int(document, &SPAWN_X)?,
        y: read_int(document, &SPAWN_Y)?,
        z: read_int(document, &SPAWN_Z)?,
    })
}

pub fn set_anchor(document: &mut Document, anchor: AnchorPoint) -> Result<(), LevelError> {
    // Validate all three leaves before touching any of them.
    get_anchor(document)?;
    write_int(document, &SPAWN_X, anchor.x)?;
    write_int(document, &SPAWN_Y, anchor.y)?;
    write_int(document, &SPAWN_Z, anchor.z)?;
    Ok(())
}

fn dimensions(document: &Document) -> Result<&Compound, LevelError> {
    document
        .root
        .path(&DIMENSIONS)
        .and_then(Tag::as_compound)
        .ok_or_else(|| LevelError::MissingField(field_name(&DIMENSIONS)))
}

pub fn list_dimension_profiles(document: &Document) -> Result<BTreeSet<String>, LevelError> {
    Ok(dimensions(document)?.keys().map(str::to_owned).collect())
}

/// Makes `to` generate with `from`'s generator settings.
pub fn copy_profile(document: &mut Document, from: &str, to: &str) -> Result<(), LevelError> {
    let profile = dimensions(document)?
        .get(from)
        .cloned()
        .ok_or_else(|| LevelError::PartitionNotFound(from.to_string()))?;
    let dimensions = document
        .root
        .path_mut(&DIMENSIONS)
        .and_then(Tag::as_compound_mut)
        .ok_or_else(|| LevelError::MissingField(field_name(&DIMENSIONS)))?;
    dimensions.insert(to, profile);
    Ok(())
}

pub fn read_spawn(level: &Path) -> Result<AnchorPoint, LevelError> {
    get_anchor(&Document::load(level)?)
}

pub fn write_spawn(level: &Path, anchor: AnchorPoint) -> Result<(), LevelError> {
    let mut document = Document::load(level)?;
    set_anchor(&mut document, anchor)?;
    document.save(level)?;
    Ok(())
}

pub fn read_dimensions(level: &Path) -> Result<BTreeSet<String>, LevelError> {
    list_dimension_profiles(&Document::load(level)?)
}

/// Copies a dimension's generator settings onto the overworld entry.
pub fn apply_dimension_profile(level: &Path, dimension: &str) -> Result<(), LevelError> {
    let mut document = Document::load(level)?;
    copy_profile(&mut document, dimension, OVERWORLD)?;
    document.save(level)?;
    Ok(())
}
