mod zip;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::package::DependencyKey;
use crate::runtime::Runtime;

pub use zip::ZipExtractor;

/// Format-specific package archive extractor.
pub trait ArchiveExtractor {
    /// Whether this extractor understands the archive at `archive_path`.
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Unpack the archive into `extract_to`, keeping its internal layout.
    fn extract<R: Runtime>(&self, runtime: &R, archive_path: &Path, extract_to: &Path)
    -> Result<()>;
}

/// Unpack a `<key>.<ext>` package archive into `<downloads>/<key>/` and return
/// that folder. A leftover folder from an earlier extraction is replaced.
#[tracing::instrument(skip(runtime, extractor))]
pub fn stage_archive<R: Runtime, E: ArchiveExtractor>(
    runtime: &R,
    extractor: &E,
    archive_path: &Path,
    downloads_dir: &Path,
) -> Result<PathBuf> {
    if !extractor.can_handle(archive_path) {
        bail!("Unsupported archive format: {}", archive_path.display());
    }

    let key: DependencyKey = archive_path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Archive name {:?} is not valid UTF-8", archive_path))?
        .parse()
        .with_context(|| format!("Archive name {:?} is not a dependency key", archive_path))?;

    let folder = downloads_dir.join(key.as_str());
    if runtime.exists(&folder) {
        warn!("Replacing previously extracted folder {:?}", folder);
        runtime.remove_dir_all(&folder)?;
    }
    runtime.create_dir_all(&folder)?;

    if let Err(e) = extractor.extract(runtime, archive_path, &folder) {
        let _ = runtime.remove_dir_all(&folder);
        return Err(e);
    }
    info!("Extracted {} to {:?}", key, folder);
    Ok(folder)
}
