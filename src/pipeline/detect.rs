use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::geometry::BBox;

/// Source of raw text regions for a page.
pub trait Detector: Send + Sync {
    fn detect(&self, image_path: &Path) -> Result<Vec<BBox>>;
}

/// Reads boxes from a JSON file produced by an external detector.
///
/// Without an explicit path, `<stem>.boxes.json` next to the page is used.
#[derive(Debug, Clone, Default)]
pub struct BoxesFileDetector {
    path: Option<PathBuf>,
}

impl BoxesFileDetector {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn sidecar_path(image_path: &Path) -> PathBuf {
        let stem = image_path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("page");
        image_path.with_file_name(format!("{}.boxes.json", stem))
    }
}

impl Detector for BoxesFileDetector {
    fn detect(&self, image_path: &Path) -> Result<Vec<BBox>> {
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| Self::sidecar_path(image_path));
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read boxes: {}", path.display()))?;
        parse_boxes(&content).with_context(|| format!("failed to parse boxes: {}", path.display()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoxEntry {
    Array([i32; 4]),
    Object(BBox),
}

/// Parses a JSON array whose entries are `[x_min, y_min, x_max, y_max]`
/// or `{"x_min": .., "y_min": .., "x_max": .., "y_max": ..}`. Boxes
/// without positive area are dropped.
pub fn parse_boxes(content: &str) -> Result<Vec<BBox>> {
    let entries: Vec<BoxEntry> = serde_json::from_str(content)?;
    let mut boxes = Vec::with_capacity(entries.len());
    for entry in entries {
        let bbox = match entry {
            BoxEntry::Array(values) => BBox::from(values),
            BoxEntry::Object(bbox) => bbox,
        };
        if bbox.is_valid() {
            boxes.push(bbox);
        } else {
            warn!("detect: dropping degenerate box {:?}", bbox);
        }
    }
    Ok(boxes)
}
