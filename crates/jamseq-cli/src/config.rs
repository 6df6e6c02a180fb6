use std::path::{Path, PathBuf};

use jamseq_services::export::DEFAULT_COPYRIGHT;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CliConfig {
    /// `tracing` filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExportConfig {
    /// Directory for exported files when no output path is given
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_copyright")]
    pub copyright: String,
}

fn default_log_filter() -> String {
    "jamseq=info".to_string()
}

fn default_copyright() -> String {
    DEFAULT_COPYRIGHT.to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: None,
            copyright: default_copyright(),
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jamseq")
        .join("config.toml")
}

/// Read the config file, falling back to defaults if it is missing or malformed
pub fn load_config(path: &Path) -> CliConfig {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str(&s).ok())
        .unwrap_or_default()
}
