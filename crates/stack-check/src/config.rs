//! Configuration.
//!
//! Resolved in layers, later ones winning: built-in defaults, the user file
//! `<config dir>/stackcheck/config.json`, the project file `stackcheck.json`
//! in the working directory, an explicit `--config` file, then command-line
//! flags (applied by the caller).

use crate::error::StackResult;
use normalize_path::NormalizePath;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumString};

pub const PROJECT_FILE: &str = "stackcheck.json";
const HISTORY_FILE: &str = ".stackcheck_history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum diagnostics shown per file; zero shows all.
    pub error_limit: usize,
    pub warnings_as_errors: bool,
    pub format: OutputFormat,
    pub color: bool,
    /// Keep REPL history between sessions.
    pub file_history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            error_limit: 20,
            warnings_as_errors: false,
            format: OutputFormat::Human,
            color: true,
            file_history: true,
        }
    }
}

/// One configuration file. Absent fields leave the lower layer alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub error_limit: Option<usize>,
    pub warnings_as_errors: Option<bool>,
    pub format: Option<OutputFormat>,
    pub color: Option<bool>,
    pub file_history: Option<bool>,
}

impl ConfigLayer {
    pub fn from_file(path: &Path) -> StackResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Config {
    pub fn apply(&mut self, layer: &ConfigLayer) {
        if let Some(limit) = layer.error_limit {
            self.error_limit = limit;
        }
        if let Some(strict) = layer.warnings_as_errors {
            self.warnings_as_errors = strict;
        }
        if let Some(format) = layer.format {
            self.format = format;
        }
        if let Some(color) = layer.color {
            self.color = color;
        }
        if let Some(history) = layer.file_history {
            self.file_history = history;
        }
    }

    /// Loads every file layer that exists. `explicit` must exist if given.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> StackResult<Self> {
        let mut config = Config::default();
        let mut files: Vec<PathBuf> = Vec::new();
        if let Some(user) = user_config_path() {
            files.push(user);
        }
        files.push(project_dir.join(PROJECT_FILE));
        for file in files.iter().filter(|f| f.is_file()) {
            log::debug!("config layer {}", file.display());
            config.apply(&ConfigLayer::from_file(file)?);
        }
        if let Some(path) = explicit {
            log::debug!("config layer {}", path.display());
            config.apply(&ConfigLayer::from_file(path)?);
        }
        Ok(config)
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stackcheck").join("config.json"))
}

pub fn history_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(HISTORY_FILE))
        .unwrap_or_else(|| PathBuf::from(HISTORY_FILE))
}

/// File name as shown in diagnostics.
pub fn display_name(path: &Path) -> String {
    path.normalize().display().to_string()
}
