//! CLI configuration: TOML file, then environment, then flags.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use triad_merkle::{Compression, FieldElement, HasherKind, TreeConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tree: TreeConfig,
    /// Set when the hasher came from a flag, the config file or
    /// `TRIAD_HASHER` rather than the built-in default.
    #[serde(skip)]
    pub hasher_pinned: bool,
}

/// Command-line values that take precedence over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub depth: Option<usize>,
    pub zero_value: Option<FieldElement>,
    pub hasher: Option<HasherKind>,
    pub compression: Option<Compression>,
}

impl Config {
    /// Load from an explicit file, or from the default location if one
    /// exists, or from `TRIAD_*` environment variables.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self {
                    tree: TreeConfig::from_env().context("Invalid TRIAD_* environment")?,
                    hasher_pinned: std::env::var_os("TRIAD_HASHER").is_some(),
                },
            },
        };
        config.apply(overrides);
        config
            .tree
            .validate()
            .context("Invalid tree configuration")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let raw: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.hasher_pinned = raw.get("tree").and_then(|t| t.get("hasher")).is_some();
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(depth) = overrides.depth {
            self.tree.depth = depth;
        }
        if let Some(zero_value) = overrides.zero_value {
            self.tree.zero_value = zero_value;
        }
        if let Some(hasher) = overrides.hasher {
            self.tree.hasher = hasher;
            self.hasher_pinned = true;
        }
        if let Some(compression) = overrides.compression {
            self.tree.compression = compression;
        }
    }

    /// Compression for a snapshot path: its extension if that is telling,
    /// otherwise the configured default.
    pub fn compression_for(&self, path: &Path) -> Compression {
        Compression::from_path(path).unwrap_or(self.tree.compression)
    }

    /// Hasher for loading a snapshot that recorded `recorded`. An explicitly
    /// chosen hasher wins; otherwise the snapshot's own is used.
    pub fn snapshot_hasher(&self, recorded: Option<HasherKind>) -> HasherKind {
        match recorded {
            Some(kind) if !self.hasher_pinned => kind,
            _ => self.tree.hasher,
        }
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("triad").join("config.toml"))
}
