//! ROI file persistence.
//!
//! Layout: `{"rois":[{"roi":[x,y,w,h]}, ...]}`, one entry per spot in slot
//! order. A missing file is an empty registry.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::registry::{Rect, SpotRegistry};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RoiFile {
    rois: Vec<RoiEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RoiEntry {
    roi: [u32; 4],
}

impl From<Rect> for RoiEntry {
    fn from(rect: Rect) -> Self {
        Self {
            roi: [rect.x, rect.y, rect.width, rect.height],
        }
    }
}

impl From<&RoiEntry> for Rect {
    fn from(entry: &RoiEntry) -> Self {
        let [x, y, width, height] = entry.roi;
        Rect::new(x, y, width, height)
    }
}

/// Reads and writes the spot regions of one ROI file.
#[derive(Clone, Debug)]
pub struct RoiStore {
    path: PathBuf,
}

impl RoiStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Regions in slot order.
    pub fn load(&self) -> Result<Vec<Rect>> {
        if !self.path.exists() {
            log::info!("no ROI file at {}; starting empty", self.path.display());
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read ROI file {}", self.path.display()))?;
        let file: RoiFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid ROI file {}: {}", self.path.display(), e))?;
        Ok(file.rois.iter().map(Rect::from).collect())
    }

    /// Load the file into `registry`, replacing its spots. The registry is
    /// left untouched if the file or any region is invalid.
    pub fn load_into(&self, registry: &mut SpotRegistry) -> Result<usize> {
        let regions = self.load()?;
        registry.load(regions)?;
        log::info!(
            "loaded {} spots from {}",
            registry.len(),
            self.path.display()
        );
        Ok(registry.len())
    }

    /// Write every spot region, replacing the file atomically.
    pub fn save(&self, registry: &SpotRegistry) -> Result<()> {
        let file = RoiFile {
            rois: registry.regions().into_iter().map(RoiEntry::from).collect(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &data)
            .with_context(|| format!("failed to write ROI file {}", self.path.display()))
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RoiStore::new(dir.path().join("rois.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn reads_the_roi_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rois.json");
        fs::write(
            &path,
            r#"{"rois":[{"roi":[10,20,30,40]},{"roi":[50,60,70,80]}]}"#,
        )
        .unwrap();
        let regions = RoiStore::new(&path).load().unwrap();
        assert_eq!(
            regions,
            vec![Rect::new(10, 20, 30, 40), Rect::new(50, 60, 70, 80)]
        );
    }

    #[test]
    fn save_then_load_keeps_slot_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RoiStore::new(dir.path().join("rois.json"));
        let registry = SpotRegistry::from_regions([
            Rect::new(5, 5, 10, 10),
            Rect::new(0, 0, 3, 4),
        ])
        .unwrap();
        store.save(&registry).unwrap();
        assert!(!dir.path().join("rois.tmp").exists());

        let mut reloaded = SpotRegistry::new();
        assert_eq!(store.load_into(&mut reloaded).unwrap(), 2);
        assert_eq!(reloaded.regions(), registry.regions());
    }

    #[test]
    fn invalid_region_leaves_registry_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rois.json");
        fs::write(&path, r#"{"rois":[{"roi":[0,0,5,5]},{"roi":[1,1,0,9]}]}"#).unwrap();

        let mut registry = SpotRegistry::from_regions([Rect::new(1, 2, 3, 4)]).unwrap();
        assert!(RoiStore::new(&path).load_into(&mut registry).is_err());
        assert_eq!(registry.regions(), vec![Rect::new(1, 2, 3, 4)]);
    }
}
