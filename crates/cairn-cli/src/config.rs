use std::path::{Path, PathBuf};

use anyhow::Context;
use cairn_cas::BlobConfig;
use serde::{Deserialize, Serialize};

/// File read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "cairn.toml";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CairnConfig {
    /// Holds `chunks/` and `catalog/`.
    pub data_dir: PathBuf,
    pub chunk_size: u32,
    pub fanout: u32,
    /// Default tracing filter, overridden by `RUST_LOG`.
    pub log_filter: String,
}

impl Default for CairnConfig {
    fn default() -> Self {
        let blob = BlobConfig::default();
        Self {
            data_dir: PathBuf::from(".cairn"),
            chunk_size: blob.chunk_size,
            fanout: blob.fanout,
            log_filter: "info".into(),
        }
    }
}

impl CairnConfig {
    /// Load `path`, or `cairn.toml` if present, or fall back to defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.blob_config().validate()?;
        Ok(config)
    }

    pub fn blob_config(&self) -> BlobConfig {
        BlobConfig {
            chunk_size: self.chunk_size,
            fanout: self.fanout,
        }
    }
}
