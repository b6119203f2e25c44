use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use withpkgs_core::PackageManagerKind;
use withpkgs_installer::ScratchSettings;

pub(crate) const CONFIG_FILE_NAME: &str = "withpkgs.toml";

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WithPkgsConfig {
    pub manager: Option<PackageManagerKind>,
    /// Relative paths resolve against the project directory.
    pub lockfile: Option<PathBuf>,
    #[serde(default)]
    pub no_lockfile: bool,
    #[serde(default)]
    pub scratch: ScratchConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScratchConfig {
    pub prefix: Option<String>,
    pub root: Option<PathBuf>,
}

impl WithPkgsConfig {
    pub(crate) fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse withpkgs config")
    }

    /// Reads `explicit` if given, else `<project_dir>/withpkgs.toml` when it
    /// exists, else defaults.
    pub(crate) fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = project_dir.join(CONFIG_FILE_NAME);
                if !candidate.is_file() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub(crate) fn scratch_settings(&self) -> ScratchSettings {
        let mut settings = ScratchSettings::default();
        if let Some(prefix) = &self.scratch.prefix {
            settings.prefix = prefix.clone();
        }
        settings.root = self.scratch.root.clone();
        settings
    }
}
