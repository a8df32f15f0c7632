use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EditError, EditResult};

pub const CONFIG_FILE_NAME: &str = "config.toml";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("net", "pdfedit", "pdfedit")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub zoom_step: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub default_zoom: f32,
    pub thumbnail_zoom: f32,
    pub export_scale: f32,
    pub handle_cache_capacity: usize,
    pub render_cache_capacity: usize,
    pub prefetch_range: usize,
    pub pdfium_library: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zoom_step: 1.25,
            min_zoom: 0.1,
            max_zoom: 8.0,
            default_zoom: 1.0,
            thumbnail_zoom: 0.2,
            export_scale: 2.0,
            handle_cache_capacity: 8,
            render_cache_capacity: 10,
            prefetch_range: 1,
            pdfium_library: None,
            log_filter: "info".to_owned(),
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> EditResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(EditError::Config {
                    path: path.to_path_buf(),
                    source: err.into(),
                })
            }
        };
        Self::from_toml(&text).map_err(|source| EditError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let floats = [
            ("zoom_step", self.zoom_step),
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
            ("default_zoom", self.default_zoom),
            ("thumbnail_zoom", self.thumbnail_zoom),
            ("export_scale", self.export_scale),
        ];
        for (name, value) in floats {
            if !value.is_finite() || value <= 0.0 {
                return Err(anyhow!("{} must be a positive number, got {}", name, value));
            }
        }
        if self.zoom_step <= 1.0 {
            return Err(anyhow!("zoom_step must be greater than 1"));
        }
        if self.min_zoom > self.max_zoom {
            return Err(anyhow!("min_zoom must be at most max_zoom"));
        }
        if self.handle_cache_capacity == 0 {
            return Err(anyhow!("handle_cache_capacity must be at least 1"));
        }
        Ok(())
    }

    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        zoom.max(self.min_zoom).min(self.max_zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "zoom_step = 1.5\nexport_scale = 1.0\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.zoom_step, 1.5);
        assert_eq!(config.export_scale, 1.0);
        assert_eq!(config.handle_cache_capacity, 8);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "zoom_step = \"fast\"").unwrap();
        assert!(matches!(Config::load(&path), Err(EditError::Config { .. })));

        for body in [
            "zoom_step = 0.5",
            "min_zoom = nan",
            "max_zoom = nan",
            "default_zoom = inf",
            "export_scale = -1.0",
        ] {
            fs::write(&path, body).unwrap();
            assert!(
                matches!(Config::load(&path), Err(EditError::Config { .. })),
                "{} should be rejected",
                body
            );
        }
    }

    #[test]
    fn overrides_with_non_finite_values_fail_validation() {
        let mut config = Config::default();
        config.export_scale = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.thumbnail_zoom = f32::INFINITY;
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn clamp_zoom_never_panics_on_unvalidated_bounds() {
        let config = Config {
            min_zoom: f32::NAN,
            ..Config::default()
        };
        assert_eq!(config.clamp_zoom(20.0), config.max_zoom);
        assert_eq!(Config::default().clamp_zoom(0.01), 0.1);
    }
}
