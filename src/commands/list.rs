use anyhow::Result;
use log::debug;

use crate::runtime::Runtime;

use super::{Config, open_stores};

/// List installed packages with how many others require each.
#[tracing::instrument(skip(runtime, config))]
pub fn list<R: Runtime>(runtime: R, config: Config) -> Result<()> {
    let (refs, warehouse) = open_stores(&runtime, &config)?;
    if warehouse.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }
    debug!("Found {} package(s)", warehouse.len());

    for descriptor in warehouse.descriptors() {
        if !descriptor.is_installed() {
            println!("{} (unusable descriptor file)", descriptor.key());
            continue;
        }
        let version = if descriptor.info().version.is_empty() {
            "(unknown)"
        } else {
            descriptor.info().version.as_str()
        };
        match refs.count(descriptor.key()) {
            0 => println!("{} {}", descriptor.key(), version),
            n => println!("{} {} (required by {})", descriptor.key(), version, n),
        }
    }

    Ok(())
}
