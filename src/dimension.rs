//! Generating a non-overworld dimension by parking the overworld region
//! folder and moving the dimension's region folder into its place.

use crate::backup::PARKED_REGION_NAME;
use crate::error::ExploreError;
use crate::level::OVERWORLD;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

/// A dimension id and the region folder its chunks are stored in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DimensionSpec {
    pub id: String,
    pub folder: PathBuf,
}

impl DimensionSpec {
    /// Parses `id=folder`. Ids without a namespace are taken as `minecraft:`.
    pub fn parse(text: &str) -> Result<Self, ExploreError> {
        let invalid = || ExploreError::InvalidDimension(text.to_string());
        let (id, folder) = text.split_once('=').ok_or_else(invalid)?;
        let (id, folder) = (id.trim(), folder.trim());
        if id.is_empty() || folder.is_empty() {
            return Err(invalid());
        }
        let id = if id.contains(':') {
            id.to_string()
        } else {
            format!("minecraft:{id}")
        };
        Ok(Self {
            id,
            folder: PathBuf::from(folder),
        })
    }

    pub fn overworld(level_name: &str) -> Self {
        Self {
            id: OVERWORLD.to_string(),
            folder: Path::new(level_name).join("region"),
        }
    }

    pub fn is_overworld(&self) -> bool {
        self.id == OVERWORLD
    }

    pub fn region_dir(&self, server_dir: &Path) -> PathBuf {
        server_dir.join(&self.folder)
    }
}

fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize().ok()?,
        _ => std::env::current_dir().ok()?,
    };
    Some(parent.join(path.file_name()?))
}

/// Whether two paths name the same place on disk, after resolving links.
pub fn same_location(a: &Path, b: &Path) -> bool {
    match (resolve(a), resolve(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// The target region folder is sitting where the overworld's was.
#[derive(Debug)]
pub struct RegionSwap {
    overworld: PathBuf,
    parked: PathBuf,
    target: PathBuf,
    active: bool,
}

impl RegionSwap {
    /// Checks the folders `swap_in` needs without touching anything.
    /// Returns `false` when both paths are the same folder.
    pub fn check(overworld: &Path, target: &Path) -> Result<bool, ExploreError> {
        if !overworld.is_dir() {
            return Err(ExploreError::DirectoryNotFound(overworld.to_path_buf()));
        }
        if same_location(overworld, target) {
            return Ok(false);
        }
        match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
                Err(ExploreError::DirectoryNotFound(parent.to_path_buf()))
            }
            _ => Ok(true),
        }
    }

    pub fn swap_in(overworld: &Path, target: &Path) -> Result<Option<Self>, ExploreError> {
        if !Self::check(overworld, target)? {
            return Ok(None);
        }
        let parked = overworld.with_file_name(PARKED_REGION_NAME);
        if parked.symlink_metadata().is_ok() {
            return Err(ExploreError::BackupAlreadyExists { path: parked });
        }
        if !target.exists() {
            info!("Creating empty region folder {}", target.display());
            std::fs::create_dir(target).map_err(|error| ExploreError::io(target, error))?;
        }

        info!("  '{}' -> '{}'", overworld.display(), parked.display());
        std::fs::rename(overworld, &parked).map_err(|error| ExploreError::io(overworld, error))?;

        info!("  '{}' -> '{}'", target.display(), overworld.display());
        if let Err(error) = std::fs::rename(target, overworld) {
            if let Err(undo) = std::fs::rename(&parked, overworld) {
                error!(
                    "failed to move {} back to {}: {undo}",
                    parked.display(),
                    overworld.display()
                );
            }
            return Err(ExploreError::io(target, error));
        }

        Ok(Some(Self {
            overworld: overworld.to_path_buf(),
            parked,
            target: target.to_path_buf(),
            active: true,
        }))
    }

    pub fn swap_out(mut self) -> Result<(), ExploreError> {
        self.active = false;
        self.reverse()
    }

    fn reverse(&self) -> Result<(), ExploreError> {
        info!("  '{}' -> '{}'", self.overworld.display(), self.target.display());
        std::fs::rename(&self.overworld, &self.target)
            .map_err(|error| ExploreError::io(&self.overworld, error))?;
        info!("  '{}' -> '{}'", self.parked.display(), self.overworld.display());
        std::fs::rename(&self.parked, &self.overworld)
            .map_err(|error| ExploreError::io(&self.parked, error))
    }
}

impl Drop for RegionSwap {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        warn!("run ended with region folders swapped; moving them back");
        if let Err(error) = self.reverse() {
            error!("{error}");
            error!(
                "the overworld region folder is kept at {}",
                self.parked.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_UNIQUIFIER: AtomicU64 = AtomicU64::new(0);

    fn test_root(name: &str) -> PathBuf {
        let serial = TEST_UNIQUIFIER.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!(
            "mcexplore-dimension-{name}-{}-{}",
            std::process::id(),
            serial
        ));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(path.join("world").join("region")).expect("create test world");
        path
    }

    fn mark(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), name).unwrap();
    }

    #[test]
    fn parses_dimension_specs() {
        assert_eq!(
            DimensionSpec::parse("the_nether=world/DIM-1/region").unwrap(),
            DimensionSpec {
                id: "minecraft:the_nether".into(),
                folder: PathBuf::from("world/DIM-1/region"),
            }
        );
        assert_eq!(
            DimensionSpec::parse("mymod:caves=world/dimensions/mymod/caves/region")
                .unwrap()
                .id,
            "mymod:caves"
        );
        for bad in ["the_nether", "=world/DIM-1/region", "the_nether=", ""] {
            assert!(matches!(
                DimensionSpec::parse(bad),
                Err(ExploreError::InvalidDimension(_))
            ));
        }
        assert!(DimensionSpec::overworld("world").is_overworld());
        assert!(!DimensionSpec::parse("the_end=world/DIM1/region")
            .unwrap()
            .is_overworld());
    }

    #[test]
    fn swap_in_and_out_restores_both_folders() {
        let root = test_root("swap");
        let overworld = root.join("world").join("region");
        let nether = root.join("world").join("DIM-1").join("region");
        mark(&overworld, "r.0.0.mca");
        mark(&nether, "r.-1.-1.mca");

        let swap = RegionSwap::swap_in(&overworld, &nether).unwrap().unwrap();
        assert!(overworld.join("r.-1.-1.mca").is_file());
        assert!(!nether.exists());
        assert!(root
            .join("world")
            .join(PARKED_REGION_NAME)
            .join("r.0.0.mca")
            .is_file());

        swap.swap_out().unwrap();
        assert!(overworld.join("r.0.0.mca").is_file());
        assert!(nether.join("r.-1.-1.mca").is_file());
        assert!(!root.join("world").join(PARKED_REGION_NAME).exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_target_is_created_empty_and_moved_back() {
        let root = test_root("create");
        let overworld = root.join("world").join("region");
        let end = root.join("world").join("DIM1").join("region");
        std::fs::create_dir_all(end.parent().unwrap()).unwrap();
        mark(&overworld, "r.0.0.mca");

        let swap = RegionSwap::swap_in(&overworld, &end).unwrap().unwrap();
        assert_eq!(std::fs::read_dir(&overworld).unwrap().count(), 0);
        mark(&overworld, "r.5.5.mca");
        swap.swap_out().unwrap();

        assert!(end.join("r.5.5.mca").is_file());
        assert!(overworld.join("r.0.0.mca").is_file());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn same_folder_is_not_renamed() {
        let root = test_root("same");
        let overworld = root.join("world").join("region");
        mark(&overworld, "r.0.0.mca");
        let aliased = root.join("world").join(".").join("region");
        assert!(RegionSwap::swap_in(&overworld, &aliased).unwrap().is_none());
        assert!(overworld.join("r.0.0.mca").is_file());
        assert!(!root.join("world").join(PARKED_REGION_NAME).exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_directories_are_reported() {
        let root = test_root("missing");
        let overworld = root.join("world").join("region");
        let orphan = root.join("nowhere").join("region");
        match RegionSwap::swap_in(&overworld, &orphan) {
            Err(ExploreError::DirectoryNotFound(path)) => {
                assert_eq!(path, root.join("nowhere"))
            }
            other => panic!("unexpected result {other:?}"),
        }
        let absent = root.join("other").join("region");
        assert!(matches!(
            RegionSwap::swap_in(&absent, &overworld),
            Err(ExploreError::DirectoryNotFound(_))
        ));
        assert!(overworld.is_dir());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn check_reports_without_creating_anything() {
        let root = test_root("check");
        let overworld = root.join("world").join("region");
        let end = root.join("world").join("DIM1").join("region");
        std::fs::create_dir_all(end.parent().unwrap()).unwrap();
        assert!(RegionSwap::check(&overworld, &end).unwrap());
        assert!(!end.exists());
        assert!(!RegionSwap::check(&overworld, &overworld).unwrap());
        assert!(matches!(
            RegionSwap::check(&overworld, &root.join("nowhere").join("region")),
            Err(ExploreError::DirectoryNotFound(_))
        ));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn parked_folder_from_earlier_run_blocks_swap() {
        let root = test_root("parked");
        let overworld = root.join("world").join("region");
        let nether = root.join("world").join("DIM-1").join("region");
        mark(&nether, "r.0.0.mca");
        std::fs::create_dir_all(root.join("world").join(PARKED_REGION_NAME)).unwrap();
        assert!(matches!(
            RegionSwap::swap_in(&overworld, &nether),
            Err(ExploreError::BackupAlreadyExists { .. })
        ));
        assert!(nether.join("r.0.0.mca").is_file());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn drop_moves_folders_back() {
        let root = test_root("drop");
        let overworld = root.join("world").join("region");
        let nether = root.join("world").join("DIM-1").join("region");
        mark(&overworld, "r.0.0.mca");
        mark(&nether, "r.-1.-1.mca");
        {
            let _swap = RegionSwap::swap_in(&overworld, &nether).unwrap();
        }
        assert!(overworld.join("r.0.0.mca").is_file());
        assert!(nether.join("r.-1.-1.mca").is_file());
        let _ = std::fs::remove_dir_all(&root);
    }
}
