//! Path resolution for the chat client's local files.
//!
//! Resolved once at startup from: `--data-dir` > `ACE_DATA_DIR` env > `~/.ace`.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Priority: `explicit` arg > `ACE_DATA_DIR` env > `~/.ace` default.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let root = if let Some(p) = explicit {
            p.to_path_buf()
        } else if let Ok(env_val) = std::env::var("ACE_DATA_DIR") {
            PathBuf::from(env_val)
        } else {
            dirs::home_dir()
                .context("HOME directory not found; pass --data-dir")?
                .join(".ace")
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create all required subdirectories under the data dir.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();
        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.config_path(), tmp.path().join("config.toml"));
    }

    #[test]
    fn ensure_dirs_creates_log_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path().join("nested").as_path())).unwrap();
        dir.ensure_dirs().unwrap();
        assert!(dir.log_dir().is_dir());
    }
}
