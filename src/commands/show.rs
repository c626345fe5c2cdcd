use anyhow::{Result, bail};
use log::debug;

use crate::package::{DependencyKey, Lookup, PackageState};
use crate::runtime::Runtime;

use super::{Config, open_stores};

/// Show everything recorded about one package.
#[tracing::instrument(skip(runtime, config))]
pub fn show<R: Runtime>(runtime: R, key: &str, config: Config) -> Result<()> {
    debug!("Showing info for {}", key);
    let key: DependencyKey = key.parse()?;
    let (refs, warehouse) = open_stores(&runtime, &config)?;

    let Lookup::Found(descriptor) = warehouse.lookup(&key) else {
        bail!("Package {} is not installed.", key);
    };
    let info = descriptor.info();

    println!("Package: {}", info.key);
    println!(
        "Descriptor: {}",
        warehouse.dir().join(descriptor.file_name()).display()
    );
    if let PackageState::Detached = descriptor.state() {
        println!("Status: unusable descriptor file");
        return Ok(());
    }

    let field = |value: &str| {
        if value.is_empty() {
            "(none)".to_string()
        } else {
            value.to_string()
        }
    };
    println!("Name: {}", field(&info.name));
    println!("Version: {}", field(&info.version));
    println!("Developer: {}", field(&info.developer));
    println!("Description: {}", field(&info.description));
    println!("Website: {}", field(&info.website_url));
    println!("Package page: {}", field(&info.package_url));
    println!("Required by: {} package(s)", refs.count(&key));

    println!("\nDependencies:");
    if descriptor.dependencies().is_empty() {
        println!("  (none)");
    }
    for dependency in descriptor.dependencies() {
        let state = if warehouse
            .lookup(dependency)
            .found()
            .is_some_and(|d| d.is_installed())
        {
            "installed"
        } else {
            "missing"
        };
        println!("  {} [{}]", dependency, state);
    }

    println!("\nInstalled files:");
    for path in descriptor.install_paths() {
        println!("  {}", path.display());
    }

    Ok(())
}
