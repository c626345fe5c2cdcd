use anyhow::{Result, bail};
use log::debug;

use crate::package::{DeleteOutcome, DependencyKey, Lookup, PackageDescriptor};
use crate::runtime::Runtime;

use super::{Config, open_stores};

/// Remove one installed package and any dependency it leaves unreferenced.
#[tracing::instrument(skip(runtime, config))]
pub fn remove<R: Runtime>(runtime: R, key: &str, yes: bool, config: Config) -> Result<()> {
    let key: DependencyKey = key.parse()?;
    let (mut refs, mut warehouse) = open_stores(&runtime, &config)?;

    let Lookup::Found(mut descriptor) = warehouse.take(&key) else {
        bail!("Package {} is not installed.", key);
    };

    let references = refs.count(&key);
    if references > 0 {
        println!(
            "{} is still required by {} package(s), not removing.",
            key, references
        );
        return Ok(());
    }

    if !yes {
        show_removal_plan(&descriptor);
        if !runtime.confirm("Proceed with removal?")? {
            println!("Removal cancelled.");
            return Ok(());
        }
    }

    match descriptor.delete(&mut refs, &mut warehouse) {
        DeleteOutcome::Removed { clean: true } => println!("Removed {}", key),
        DeleteOutcome::Removed { clean: false } => {
            bail!("{} was only partly removed; some files could not be deleted", key)
        }
        DeleteOutcome::NotInstalled => {
            bail!("Descriptor file for {} is unusable; nothing was removed", key)
        }
        DeleteOutcome::StillRequired(n) => {
            println!("{} is still required by {} package(s), not removing.", key, n)
        }
    }
    Ok(())
}

/// Remove every installed package.
#[tracing::instrument(skip(runtime, config))]
pub fn remove_all<R: Runtime>(runtime: R, yes: bool, config: Config) -> Result<()> {
    let (mut refs, mut warehouse) = open_stores(&runtime, &config)?;
    if warehouse.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    if !yes {
        println!();
        println!("=== Removal Plan ===");
        println!();
        for descriptor in warehouse.descriptors() {
            println!("  [DEL] {}", descriptor.key());
        }
        println!();
        if !runtime.confirm(&format!("Remove all {} package(s)?", warehouse.len()))? {
            println!("Removal cancelled.");
            return Ok(());
        }
    }

    let clean = warehouse.delete_all(&mut refs)?;
    debug!("{} descriptor(s) left after removal", warehouse.len());

    if !warehouse.is_empty() {
        println!("Kept {} package(s):", warehouse.len());
        for descriptor in warehouse.descriptors() {
            let reason = if descriptor.is_installed() {
                format!("required by {}", refs.count(descriptor.key()))
            } else {
                "unusable descriptor file".to_string()
            };
            println!("  {} ({})", descriptor.key(), reason);
        }
    }
    if !clean {
        bail!("Some package files could not be deleted");
    }
    println!("Removal complete.");
    Ok(())
}

fn show_removal_plan(descriptor: &PackageDescriptor) {
    println!();
    println!("=== Removal Plan ===");
    println!();
    println!("Package: {}", descriptor.key());
    println!();
    println!("Files to remove:");
    for path in descriptor.install_paths() {
        println!("  [DEL] {}", path.display());
    }
    if !descriptor.dependencies().is_empty() {
        println!();
        println!("Dependencies released (removed when no longer required):");
        for dependency in descriptor.dependencies() {
            println!("  {}", dependency);
        }
    }
    println!();
}
