use std::path::Path;

use config::{Environment, File, FileFormat};
use dift_core::error::DiftError;
pub use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A section of the configuration file.
/// Implementors should mark the struct `#[serde(default)]` so that a partial
/// section falls back to the default of each missing field.
pub trait Config: DeserializeOwned + Serialize + Sized {
    fn section_name() -> &'static str;

    fn load() -> Result<Self, DiftError> {
        ConfigLoader::load_cfg(Self::section_name())
    }

    fn load_or(default: Self) -> Result<Self, DiftError> {
        ConfigLoader::load_cfg_or_default(Self::section_name(), default)
    }

    fn load_from_file(path: impl AsRef<Path>, default: Self) -> Result<Self, DiftError> {
        ConfigLoader::load_cfg_from_file(path, Self::section_name(), default)
    }

    fn must_load() -> Self
    where
        Self: Default,
    {
        Self::load_or(Self::default()).expect("failed to load config")
    }
}

pub struct ConfigLoader {}

pub static CONFIG_FILE_ENV_VAR: &str = "DIFT_CONFIG";
pub static CONFIG_ENV_PREFIX: &str = "DIFT";
pub static CONFIG_ENV_PREFIX_SEPARATOR: &str = "_";
/// Separates nested keys, e.g. `DIFT_TAINT__NUM_COLORS`.
pub static CONFIG_ENV_SEPARATOR: &str = "__";

impl ConfigLoader {
    fn config_file() -> String {
        std::env::var(CONFIG_FILE_ENV_VAR).unwrap_or_else(|_| "config.toml".to_string())
    }

    /// Environment variables take precedence over the file.
    fn build(config_file: &str, required: bool) -> Result<config::Config, DiftError> {
        config::Config::builder()
            .add_source(File::new(config_file, FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator(CONFIG_ENV_PREFIX_SEPARATOR)
                    .separator(CONFIG_ENV_SEPARATOR),
            )
            .build()
            .map_err(|e| DiftError::Config(format!("failed to build config: {}", e)))
    }

    fn section<T: DeserializeOwned>(
        cfg: config::Config,
        section: &str,
        default: Option<T>,
    ) -> Result<T, DiftError> {
        match (cfg.get::<T>(section), default) {
            (Ok(c), _) => Ok(c),
            (Err(config::ConfigError::NotFound(_)), Some(default)) => Ok(default),
            (Err(e), _) => Err(DiftError::Config(format!("{}", e))),
        }
    }

    pub fn load_cfg_or_default<T: DeserializeOwned>(
        section: &str,
        default: T,
    ) -> Result<T, DiftError> {
        let cfg = Self::build(&Self::config_file(), false)?;
        Self::section(cfg, section, Some(default))
    }

    pub fn load_cfg<T: DeserializeOwned>(section: &str) -> Result<T, DiftError> {
        let cfg = Self::build(&Self::config_file(), false)?;
        Self::section(cfg, section, None)
    }

    /// Load a section from an explicitly given file, which must exist.
    pub fn load_cfg_from_file<T: DeserializeOwned>(
        path: impl AsRef<Path>,
        section: &str,
        default: T,
    ) -> Result<T, DiftError> {
        let path = path.as_ref().to_str().ok_or_else(|| {
            DiftError::Config(format!("non utf-8 config path: {:?}", path.as_ref()))
        })?;
        let cfg = Self::build(path, true)?;
        Self::section(cfg, section, Some(default))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use dift_core::error::DiftError;
    use tempfile::NamedTempFile;

    use super::{Config, ConfigLoader};

    #[derive(Debug, Clone, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
    #[serde(default)]
    struct TestConfig {
        name: String,
        depth: u32,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                depth: 7,
            }
        }
    }

    impl Config for TestConfig {
        fn section_name() -> &'static str {
            "abc"
        }
    }

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_section_from_file() {
        let file = config_file(
            r#"
        [abc]
        name = "abc"
        depth = 3
        "#,
        );
        let cfg = TestConfig::load_from_file(file.path(), Default::default()).unwrap();
        assert_eq!(
            cfg,
            TestConfig {
                name: "abc".to_string(),
                depth: 3
            }
        );
    }

    #[test]
    fn test_partial_section() {
        let file = config_file(
            r#"
        [abc]
        depth = 1
        "#,
        );
        let cfg = TestConfig::load_from_file(file.path(), Default::default()).unwrap();
        assert_eq!(cfg.name, "default");
        assert_eq!(cfg.depth, 1);
    }

    #[test]
    fn test_missing_section() {
        let file = config_file(
            r#"
        [other]
        name = "x"
        "#,
        );
        let cfg = TestConfig::load_from_file(file.path(), Default::default()).unwrap();
        assert_eq!(cfg, TestConfig::default());
    }

    #[test]
    fn test_must_load_without_config_file() {
        assert_eq!(TestConfig::must_load(), TestConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let cfg: Result<TestConfig, DiftError> = ConfigLoader::load_cfg_from_file(
            "/dev/non_exist/dift.toml",
            "abc",
            TestConfig::default(),
        );
        assert!(matches!(cfg, Err(DiftError::Config(_))));
    }
}
