use std::path::PathBuf;

use dift_core::{error::DiftError, register::Gpr};
use dift_utils::config::{Config, Deserialize, Serialize};

use crate::{
    report::ReportFormat,
    taint::{policy::StackFramePolicy, MAX_COLORS},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaintConfig {
    /// Size of the color pool, 1..=64.
    pub num_colors: usize,
    /// State records are only reported once more than this many
    /// instructions have executed.
    pub warmup: u64,
    /// Loads addressed only through these registers mint no color.
    pub untracked_base_registers: Vec<String>,
    pub report_format: ReportFormat,
    /// Report destination, stdout if unset.
    pub output: Option<PathBuf>,
}

impl Default for TaintConfig {
    fn default() -> Self {
        Self {
            num_colors: 32,
            warmup: 0,
            untracked_base_registers: vec!["rsp".to_string(), "rbp".to_string()],
            report_format: ReportFormat::Csv,
            output: None,
        }
    }
}

impl Config for TaintConfig {
    fn section_name() -> &'static str {
        "taint"
    }
}

impl TaintConfig {
    pub fn validate(&self) -> Result<(), DiftError> {
        if self.num_colors == 0 {
            return Err(DiftError::Config("num_colors must be positive".to_string()));
        }
        if self.num_colors > MAX_COLORS {
            return Err(DiftError::Unsupported(format!(
                "{} colors, at most {} are supported",
                self.num_colors, MAX_COLORS
            )));
        }
        Ok(())
    }

    pub fn track_policy(&self) -> Result<StackFramePolicy, DiftError> {
        let registers = self
            .untracked_base_registers
            .iter()
            .map(|name| {
                Gpr::from_alias(name).ok_or_else(|| {
                    DiftError::Config(format!("not a general-purpose register: {}", name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StackFramePolicy::new(registers))
    }
}
