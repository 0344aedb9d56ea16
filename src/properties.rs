//! `server.properties` and `eula.txt`.

use crate::error::ExploreError;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

pub const SERVER_PROPERTIES: &str = "server.properties";
pub const EULA: &str = "eula.txt";
pub const LEVEL_NAME: &str = "level-name";

pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| match line.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

pub fn read_properties(path: &Path) -> Result<BTreeMap<String, String>, ExploreError> {
    let text = std::fs::read_to_string(path).map_err(|error| {
        if error.kind() == io::ErrorKind::NotFound {
            ExploreError::MissingPersistentState(path.to_path_buf())
        } else {
            ExploreError::io(path, error)
        }
    })?;
    Ok(parse_properties(&text))
}

/// A missing `eula.txt` counts as accepted; the server writes one on first
/// start.
pub fn eula_accepted(path: &Path) -> Result<bool, ExploreError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(!text.lines().any(|line| line.trim() == "eula=false")),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(error) => Err(ExploreError::io(path, error)),
    }
}

pub fn level_name(properties: &BTreeMap<String, String>) -> Option<&str> {
    properties
        .get(LEVEL_NAME)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}
