use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::APP_NAME;

/// Locations of everything Snoopy keeps on disk.
///
/// Built once by the application and handed to whatever needs a path
/// (`SqliteStore::open_in`, `logging::subscriber`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    base: PathBuf,
}

impl AppPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `~/.snoopy.d`, if a home directory can be determined
    pub fn default_base() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(format!(".{}.d", APP_NAME)))
    }

    /// Paths rooted at the default base directory
    pub fn from_home() -> anyhow::Result<Self> {
        Self::default_base()
            .map(Self::new)
            .ok_or_else(|| anyhow::anyhow!("cannot determine the home directory"))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn db(&self) -> PathBuf {
        self.base.join(format!("{}.db", APP_NAME))
    }

    pub fn log(&self) -> PathBuf {
        self.base.join(format!("{}.log", APP_NAME))
    }

    pub fn config(&self) -> PathBuf {
        self.base.join(format!("{}.toml", APP_NAME))
    }

    pub fn spool(&self) -> PathBuf {
        self.base.join("spool")
    }

    /// Create the base and spool directories if they are missing
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.spool())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SnoopyConfig {
    pub base_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub terminal_log: Option<bool>,
}

impl SnoopyConfig {
    /// The paths this configuration selects
    pub fn paths(&self) -> anyhow::Result<AppPaths> {
        match &self.base_dir {
            Some(base) => Ok(AppPaths::new(base)),
            None => AppPaths::from_home(),
        }
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<Option<SnoopyConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)?;
    let config: SnoopyConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &SnoopyConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_layout() {
        let paths = AppPaths::new("/tmp/snoopy-base");
        assert_eq!(paths.db(), PathBuf::from("/tmp/snoopy-base/snoopy.db"));
        assert_eq!(paths.log(), PathBuf::from("/tmp/snoopy-base/snoopy.log"));
        assert_eq!(paths.config(), PathBuf::from("/tmp/snoopy-base/snoopy.toml"));
        assert_eq!(paths.spool(), PathBuf::from("/tmp/snoopy-base/spool"));
    }

    #[test]
    fn test_ensure_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path().join("nested").join("base"));

        paths.ensure().unwrap();
        assert!(paths.base().is_dir());
        assert!(paths.spool().is_dir());
        // Second call is a no-op
        paths.ensure().unwrap();
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("snoopy.toml");

        assert!(load_config(&path).unwrap().is_none());

        let config = SnoopyConfig {
            base_dir: Some(dir.path().join("base")),
            log_level: Some("debug".to_string()),
            terminal_log: Some(false),
        };
        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.paths().unwrap().base(), dir.path().join("base"));
    }

    #[test]
    fn test_partial_config() {
        let config: SnoopyConfig = toml::from_str("log_level = \"warn\"").unwrap();
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert!(config.base_dir.is_none());
        assert!(config.terminal_log.is_none());
    }
}
