//! Configuration resolution and path discovery.
//!
//! Lookup order: `--config`, then `AT_CONFIG`, then the user and system
//! config directories, then built-in defaults.

use std::path::{Path, PathBuf};

use crate::config::AuditConfig;
use crate::validate::{validate_config, ValidationResult};

/// Which lookup step produced the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line.
    CliArgument,
    /// `AT_CONFIG`.
    Environment,
    /// `~/.config/audit-trail/`.
    XdgConfig,
    /// `/etc/audit-trail/`.
    SystemConfig,
    /// No file anywhere; compiled-in values.
    #[default]
    BuiltinDefault,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::CliArgument => "cli",
            ConfigSource::Environment => "env",
            ConfigSource::XdgConfig => "user-dir",
            ConfigSource::SystemConfig => "system-dir",
            ConfigSource::BuiltinDefault => "defaults",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment variable naming the config file.
const ENV_CONFIG_PATH: &str = "AT_CONFIG";

/// Standard config file names, in lookup order.
const CONFIG_FILENAMES: [&str; 2] = ["audit.toml", "audit.json"];

/// Directory name under the user and system config roots.
const APP_NAME: &str = "audit-trail";

/// A resolved, validated configuration together with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AuditConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
    /// Raw file content, kept for snapshot hashing.
    pub raw: Option<String>,
}

/// Resolve the config file path.
///
/// An explicit path or `AT_CONFIG` must name an existing file to count.
/// The user and system directories are searched for `audit.toml` first,
/// then `audit.json`. With nothing found the built-in defaults apply.
pub fn resolve_config_path(cli_path: Option<&Path>) -> (Option<PathBuf>, ConfigSource) {
    let explicit = [
        (cli_path.map(Path::to_path_buf), ConfigSource::CliArgument),
        (
            std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from),
            ConfigSource::Environment,
        ),
    ];
    let found = explicit
        .into_iter()
        .find_map(|(path, source)| path.filter(|p| p.is_file()).map(|p| (p, source)));
    if let Some((path, source)) = found {
        return (Some(path), source);
    }

    let roots = [
        (xdg_config_dir(), ConfigSource::XdgConfig),
        (Some(system_config_dir()), ConfigSource::SystemConfig),
    ];
    roots.into_iter()
        .find_map(|(dir, source)| dir.and_then(|d| find_in_dir(&d)).map(|p| (Some(p), source)))
        .unwrap_or((None, ConfigSource::BuiltinDefault))
}

/// Resolve, parse, apply environment overrides and validate.
pub fn load_config(cli_path: Option<&Path>) -> ValidationResult<LoadedConfig> {
    let (path, source) = resolve_config_path(cli_path);

    let (mut config, raw) = match &path {
        Some(p) => {
            let raw = std::fs::read_to_string(p).ok();
            (AuditConfig::from_file(p)?, raw)
        }
        None => (AuditConfig::default(), None),
    };

    config.apply_env_overrides()?;
    validate_config(&config)?;

    Ok(LoadedConfig {
        config,
        path,
        source,
        raw,
    })
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Per-user directory, e.g. `~/.config/audit-trail`.
pub fn xdg_config_dir() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join(APP_NAME))
}

pub fn system_config_dir() -> PathBuf {
    Path::new("/etc").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_names() {
        assert_eq!(ConfigSource::CliArgument.to_string(), "cli");
        assert_eq!(ConfigSource::default().as_str(), "defaults");
    }

    #[test]
    fn test_find_in_dir_prefers_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("audit.json"), "{}").unwrap();
        assert_eq!(find_in_dir(dir.path()), Some(dir.path().join("audit.json")));

        std::fs::write(dir.path().join("audit.toml"), "").unwrap();
        assert_eq!(find_in_dir(dir.path()), Some(dir.path().join("audit.toml")));
    }

    #[test]
    fn test_cli_path_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, "{}").unwrap();

        let (resolved, source) = resolve_config_path(Some(&path));
        assert_eq!(resolved, Some(path));
        assert_eq!(source, ConfigSource::CliArgument);
    }

    #[test]
    fn test_load_from_cli_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.toml");
        std::fs::write(&path, "[queue]\ncapacity = 64\nworker_buffer_capacity = 8\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.config.queue.capacity, 64);
        assert_eq!(loaded.source, ConfigSource::CliArgument);
        assert!(loaded.raw.unwrap().contains("capacity"));
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.json");
        std::fs::write(&path, r#"{"queue": {"workers": 0}}"#).unwrap();

        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_cli_path_is_ignored() {
        let dir = TempDir::new().unwrap();
        let (_, source) = resolve_config_path(Some(&dir.path().join("absent.toml")));
        assert_ne!(source, ConfigSource::CliArgument);
    }
}
