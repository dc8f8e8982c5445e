use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

use noorsigner_core::error::{Result, SignerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn deserialize_path<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
        .map(|opt| opt.map(|s| PathBuf::from(shellexpand::tilde(&s).as_ref())))
}

/// Optional CLI configuration, read from
/// `<config_dir>/noorsigner/config.toml` when present.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Storage root override; defaults to `~/.noorsigner`.
    #[serde(default, deserialize_with = "deserialize_path")]
    pub root: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("noorsigner").join("config.toml"))
            .ok_or(SignerError::HomeNotFound)
    }

    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| SignerError::Other(format!("config {}: {e}", path.display())))
    }

    /// The storage root, honoring the config override.
    pub fn signer_root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => noorsigner_core::default_signer_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let cfg: Config =
            toml::from_str("root = \"~/signer-data\"\nlog_level = \"debug\"").unwrap();
        assert!(cfg.root.unwrap().ends_with("signer-data"));
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_empty_config_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.root.is_none());
        assert_eq!(cfg.log_level, LogLevel::Info);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("unknown_key = 1").is_err());
    }
}
