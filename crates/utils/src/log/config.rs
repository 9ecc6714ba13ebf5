use std::path::PathBuf;

use crate::config::Config;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub console_level: String,
    pub file_level: String,
    /// Extra level for the taint engine only, e.g. `trace` to dump the taint
    /// table after every instruction without tracing everything else.
    pub engine_level: Option<String>,
    /// JSON log file, appended to.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: "info".to_string(),
            file_level: "info".to_string(),
            engine_level: None,
            file: None,
        }
    }
}

impl Config for LogConfig {
    fn section_name() -> &'static str {
        "log"
    }
}
