//! Configuration and shard descriptor loading
//!
//! Settings persist as TOML next to the binary; shard descriptors are a
//! separate JSON document in the shape the calibration tooling exports
//! (`index`, `sourcePoints`, `displayPoints`, `maskPoints` per shard).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::homography::Point;
use crate::view::ViewState;

/// Render target dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        // 4K output target
        Self {
            width: 3840,
            height: 2160,
        }
    }
}

/// Paths to the externally produced inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Source image mapped across the shards.
    pub image: PathBuf,
    /// JSON document holding the shard descriptors.
    pub shards: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::from("source.png"),
            shards: PathBuf::from("shards.json"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub data: DataConfig,

    /// Initial view settings (background, pan/zoom, selection, tint).
    #[serde(default)]
    pub view: ViewState,
}

impl Config {
    /// Load configuration from a file, or create default if it doesn't exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Created default configuration at {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

/// One shard as supplied by the data loader: a stable index, the point
/// correspondences, and the mask perimeter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardDescriptor {
    pub index: usize,
    pub source_points: Vec<Point>,
    pub display_points: Vec<Point>,
    pub mask_points: Vec<Point>,
}

/// Load shard descriptors from a JSON file, preserving document order.
pub fn load_shards(path: &Path) -> Result<Vec<ShardDescriptor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read shard data from {:?}", path))?;
    let shards: Vec<ShardDescriptor> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse shard data from {:?}", path))?;

    tracing::info!("Loaded {} shard descriptors from {:?}", shards.len(), path);
    Ok(shards)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.display.width, 3840);
        assert_eq!(parsed.display.height, 2160);
        assert_eq!(parsed.view.zoom, 1.0);
        assert!(parsed.view.show_all);
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let parsed: Config = toml::from_str("[display]\nwidth = 1920\nheight = 1080\n").unwrap();
        assert_eq!(parsed.display.width, 1920);
        assert_eq!(parsed.data.shards, PathBuf::from("shards.json"));
        assert_eq!(parsed.view.background, [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_shard_descriptor_uses_camel_case_keys() {
        let json = r#"{
            "index": 2,
            "sourcePoints": [{"x": 0.0, "y": 0.0}, {"x": 10.0, "y": 0.0}],
            "displayPoints": [{"x": 5.0, "y": 5.0}],
            "maskPoints": [{"x": 1.0, "y": 1.0}, {"x": 2.0, "y": 1.0}, {"x": 2.0, "y": 2.0}]
        }"#;

        let desc: ShardDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.index, 2);
        assert_eq!(desc.source_points.len(), 2);
        assert_eq!(desc.display_points.len(), 1);
        assert_eq!(desc.mask_points.len(), 3);
        assert_eq!(desc.mask_points[2], Point::new(2.0, 2.0));
    }
}
