use anyhow::{Result, bail};
use log::debug;
use std::path::PathBuf;

use crate::paths::ManagerPaths;
use crate::runtime::Runtime;

/// Resolved command settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub paths: ManagerPaths,
}

impl Config {
    /// Resolve the game directory and make sure the manager directories exist.
    pub fn new<R: Runtime>(runtime: &R, game_dir: Option<PathBuf>) -> Result<Self> {
        let Some(game_dir) = game_dir else {
            bail!("No game directory given; pass --game-dir or set MODSTASH_GAME_DIR");
        };
        debug!("Using game directory: {:?}", game_dir);

        let paths = ManagerPaths::new(game_dir);
        paths.ensure_dirs(runtime)?;
        Ok(Self { paths })
    }
}
