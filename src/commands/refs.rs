use anyhow::Result;

use crate::package::ReferenceStore;
use crate::runtime::Runtime;

use super::Config;

/// Print the dependency reference counts.
#[tracing::instrument(skip(runtime, config))]
pub fn refs<R: Runtime>(runtime: R, config: Config) -> Result<()> {
    let store = ReferenceStore::open(&runtime, config.paths.references_file())?;
    if store.is_empty() {
        println!("No dependency references recorded.");
        return Ok(());
    }
    for (key, count) in store.iter() {
        println!("{}: {}", key, count);
    }
    Ok(())
}
