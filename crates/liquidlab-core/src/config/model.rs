use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::consts::include;
use crate::error::{LiquidlabError, Result};
use crate::template::Mode;

/// Engine defaults, usually read from the `[engine]` table of a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tokenizer mode used when a template has no mode directive
    #[serde(default)]
    pub mode: Mode,
    /// Emit compile-time debug events for every template
    #[serde(default)]
    pub debug: bool,
    /// Directory `{% include %}` paths are resolved against
    #[serde(default)]
    pub include_dir: Option<PathBuf>,
    #[serde(default = "default_include_extension")]
    pub include_extension: String,
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            debug: false,
            include_dir: None,
            include_extension: default_include_extension(),
            max_include_depth: default_max_include_depth(),
        }
    }
}

fn default_include_extension() -> String {
    include::DEFAULT_EXTENSION.to_string()
}

fn default_max_include_depth() -> usize {
    include::MAX_DEPTH
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
}

impl EngineConfig {
    /// Parse a TOML document; settings live under an optional `[engine]` table
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| LiquidlabError::ConfigParseError(e.to_string()))?;
        Ok(file.engine)
    }

    /// Read and parse a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Serialize as an `[engine]` table
    pub fn to_toml_string(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Wrapper<'a> {
            engine: &'a EngineConfig,
        }
        toml::to_string_pretty(&Wrapper { engine: self })
            .map_err(|e| LiquidlabError::ConfigParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.include_extension, "liquid");
        assert_eq!(config.max_include_depth, 32);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[engine]
mode = "compact"
debug = true
include_dir = "partials"
include_extension = "html"
max_include_depth = 4
"#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.mode, Mode::Compact);
        assert!(config.debug);
        assert_eq!(config.include_dir, Some(PathBuf::from("partials")));
        assert_eq!(config.include_extension, "html");
        assert_eq!(config.max_include_depth, 4);
    }

    #[test]
    fn test_parse_partial_engine_table() {
        let config = EngineConfig::from_toml_str("[engine]\nmode = \"mixed\"\n").unwrap();
        assert_eq!(config.mode, Mode::Mixed);
        assert_eq!(config.include_extension, "liquid");
    }

    #[test]
    fn test_invalid_mode_is_parse_error() {
        let result = EngineConfig::from_toml_str("[engine]\nmode = \"tight\"\n");
        match result {
            Err(LiquidlabError::ConfigParseError(msg)) => assert!(msg.contains("tight")),
            other => panic!("Expected ConfigParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = EngineConfig {
            mode: Mode::Mixed,
            include_dir: Some(PathBuf::from("inc")),
            ..EngineConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
