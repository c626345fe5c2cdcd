//! Where the manager keeps its own files under the game directory.
//!
//! ```text
//! <game>/MikModManager/
//!     .dependencies        reference counts
//!     mods/<key>.lcmd      one descriptor per installed package
//!     downloads/<key>/     extracted packages waiting to be installed
//! ```
//!
//! The directory and file names match what existing installations already
//! have on disk.

use anyhow::{Result, bail};
use log::info;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

pub const MANAGER_DIR: &str = "MikModManager";
pub const DESCRIPTORS_DIR: &str = "mods";
pub const DOWNLOADS_DIR: &str = "downloads";
pub const REFERENCES_FILE: &str = ".dependencies";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerPaths {
    game_dir: PathBuf,
    manager_dir: PathBuf,
}

impl ManagerPaths {
    pub fn new(game_dir: impl Into<PathBuf>) -> Self {
        let game_dir = game_dir.into();
        let manager_dir = game_dir.join(MANAGER_DIR);
        Self {
            game_dir,
            manager_dir,
        }
    }

    pub fn game_dir(&self) -> &Path {
        &self.game_dir
    }

    /// Returns: `<game>/MikModManager`
    pub fn manager_dir(&self) -> &Path {
        &self.manager_dir
    }

    /// Returns: `<game>/MikModManager/mods`
    pub fn descriptors_dir(&self) -> PathBuf {
        self.manager_dir.join(DESCRIPTORS_DIR)
    }

    /// Returns: `<game>/MikModManager/downloads`
    pub fn downloads_dir(&self) -> PathBuf {
        self.manager_dir.join(DOWNLOADS_DIR)
    }

    /// Returns: `<game>/MikModManager/.dependencies`
    pub fn references_file(&self) -> PathBuf {
        self.manager_dir.join(REFERENCES_FILE)
    }

    /// Create the manager directories that are missing. The game directory
    /// itself must already exist.
    #[tracing::instrument(skip(runtime))]
    pub fn ensure_dirs<R: Runtime>(&self, runtime: &R) -> Result<()> {
        if !runtime.is_dir(&self.game_dir) {
            bail!("Unable to locate game directory {:?}", self.game_dir);
        }
        for dir in [
            self.manager_dir.clone(),
            self.descriptors_dir(),
            self.downloads_dir(),
        ] {
            if !runtime.exists(&dir) {
                runtime.create_dir_all(&dir)?;
                info!("Created {:?}", dir);
            }
        }
        Ok(())
    }
}
