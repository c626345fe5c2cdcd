//! Subcommand entry points. Each takes the runtime by value and a resolved
//! [`Config`], prints its results and returns an error for the exit status.

pub mod config;
mod install;
mod list;
mod refs;
mod remove;
mod show;

pub use config::Config;
pub use install::install;
pub use list::list;
pub use refs::refs;
pub use remove::{remove, remove_all};
pub use show::show;

use anyhow::Result;

use crate::package::{ReferenceStore, Warehouse};
use crate::runtime::Runtime;

/// Load the reference store and the warehouse for the configured game.
fn open_stores<'a, R: Runtime>(
    runtime: &'a R,
    config: &Config,
) -> Result<(ReferenceStore<'a, R>, Warehouse<'a, R>)> {
    let refs = ReferenceStore::open(runtime, config.paths.references_file())?;
    let warehouse = Warehouse::open(runtime, config.paths.descriptors_dir())?;
    Ok((refs, warehouse))
}
