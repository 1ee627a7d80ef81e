use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use relabel_core::RewriteMode;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptorConfig {
    #[serde(default)]
    pub rewrite: RewriteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteConfig {
    #[serde(default)]
    pub mode: RewriteMode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log full script text before and after rewriting.
    #[serde(default)]
    pub echo_scripts: bool,
}

impl InterceptorConfig {
    pub fn with_mode(mode: RewriteMode) -> Self {
        Self { rewrite: RewriteConfig { mode }, ..Self::default() }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: InterceptorConfig = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(shellexpand::tilde("~/.config/relabel/relabel.toml").into_owned())
    }
}
