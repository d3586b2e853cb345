// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.
//
// Resolution order: built-in defaults, then an optional JSON file, then
// `DECKBLATT_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeckblattError, Result};

pub const ENV_COVER_IMAGE: &str = "DECKBLATT_COVER_IMAGE";
pub const ENV_WORK_DIR: &str = "DECKBLATT_WORK_DIR";
pub const ENV_WORKERS: &str = "DECKBLATT_WORKERS";
pub const ENV_JPEG_QUALITY: &str = "DECKBLATT_JPEG_QUALITY";
pub const ENV_THUMBNAIL_SIZE: &str = "DECKBLATT_THUMBNAIL_SIZE";

/// Service settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// The fixed image embedded into every document. Must exist at startup.
    pub cover_image_path: PathBuf,
    /// Parent directory for per-request scratch directories.
    pub work_dir: PathBuf,
    /// Maximum number of embeds running at once.
    pub worker_pool_size: usize,
    /// JPEG quality (1-100) for the normalized cover.
    pub jpeg_quality: u8,
    /// Longest side, in pixels, of the preview thumbnail.
    pub thumbnail_max_side: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cover_image_path: PathBuf::from("thumbnail.jpg"),
            work_dir: std::env::temp_dir().join("deckblatt"),
            worker_pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            jpeg_quality: 85,
            thumbnail_max_side: 320,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional JSON file plus the process
    /// environment, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| {
                    DeckblattError::Config(format!("cannot read {}: {}", path.display(), err))
                })?;
                Self::from_json(&raw)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply `DECKBLATT_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_COVER_IMAGE) {
            self.cover_image_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_WORK_DIR) {
            self.work_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_WORKERS) {
            self.worker_pool_size = parse_number(ENV_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_JPEG_QUALITY) {
            self.jpeg_quality = parse_number(ENV_JPEG_QUALITY, &value)?;
        }
        if let Some(value) = lookup(ENV_THUMBNAIL_SIZE) {
            self.thumbnail_max_side = parse_number(ENV_THUMBNAIL_SIZE, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(DeckblattError::Config(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.worker_pool_size == 0 {
            return Err(DeckblattError::Config(
                "worker_pool_size must be at least 1".into(),
            ));
        }
        if self.thumbnail_max_side == 0 {
            return Err(DeckblattError::Config(
                "thumbnail_max_side must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DeckblattError::Config(format!("{key} is not a valid number: {value:?}")))
}
