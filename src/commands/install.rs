use anyhow::{Result, bail};
use log::{debug, error};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveExtractor, stage_archive};
use crate::package::{DependencyKey, LayoutClassifier, PackageDescriptor, ReferenceStore, Warehouse};
use crate::runtime::Runtime;

use super::{Config, open_stores};

/// Install extracted package folders or package archives.
///
/// Every source is attempted; the command fails if any of them did.
#[tracing::instrument(skip(runtime, extractor, config))]
pub fn install<R: Runtime, E: ArchiveExtractor>(
    runtime: R,
    extractor: &E,
    sources: &[PathBuf],
    config: Config,
) -> Result<()> {
    let (mut refs, mut warehouse) = open_stores(&runtime, &config)?;
    let classifier = LayoutClassifier::new(config.paths.game_dir());
    let downloads = config.paths.downloads_dir();

    let mut failed = 0;
    for source in sources {
        let result = install_one(
            &runtime,
            extractor,
            source,
            &downloads,
            &classifier,
            &mut refs,
            &mut warehouse,
        );
        if let Err(e) = result {
            error!("Install of {:?} failed: {:#}", source, e);
            eprintln!("Failed to install {}: {:#}", source.display(), e);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} package(s) failed to install", failed, sources.len());
    }
    Ok(())
}

fn install_one<R: Runtime, E: ArchiveExtractor>(
    runtime: &R,
    extractor: &E,
    source: &Path,
    downloads: &Path,
    classifier: &LayoutClassifier,
    refs: &mut ReferenceStore<'_, R>,
    warehouse: &mut Warehouse<'_, R>,
) -> Result<()> {
    if !runtime.exists(source) {
        bail!("{} does not exist", source.display());
    }

    let folder = if runtime.is_dir(source) {
        source.to_path_buf()
    } else {
        if let Some(key) = archive_key(source)
            && already_installed(&key, warehouse)
        {
            return Ok(());
        }
        stage_archive(runtime, extractor, source, downloads)?
    };

    let mut descriptor = PackageDescriptor::from_extracted(runtime, &folder, classifier)?;
    if already_installed(descriptor.key(), warehouse) {
        return Ok(());
    }
    debug!("Staged {} from {:?}", descriptor.key(), folder);

    if let Err(e) = descriptor.install(refs, warehouse) {
        println!(
            "Cannot install {}, manual intervention required. The package can be found at: {}",
            descriptor.key(),
            folder.display()
        );
        return Err(e);
    }
    warehouse.refresh()?;
    println!("Installed {}", descriptor.key());
    Ok(())
}

fn archive_key(archive: &Path) -> Option<DependencyKey> {
    archive.file_stem()?.to_str()?.parse().ok()
}

fn already_installed<R: Runtime>(key: &DependencyKey, warehouse: &Warehouse<'_, R>) -> bool {
    let installed = warehouse
        .lookup(key)
        .found()
        .is_some_and(PackageDescriptor::is_installed);
    if installed {
        println!("{} is already installed, skipping", key);
    }
    installed
}
