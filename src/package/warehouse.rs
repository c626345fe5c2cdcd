use anyhow::Result;
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

use super::descriptor::DESCRIPTOR_EXTENSION;
use super::{DependencyKey, PackageDescriptor, ReferenceStore};

/// Result of looking a package up by dependency key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

/// Index of every descriptor file in the descriptor directory.
///
/// The index is only ever rebuilt as a whole by [`Warehouse::refresh`].
pub struct Warehouse<'a, R: Runtime> {
    runtime: &'a R,
    dir: PathBuf,
    descriptors: Vec<PackageDescriptor>,
}

impl<'a, R: Runtime> Warehouse<'a, R> {
    /// An empty warehouse over `dir`. Call [`Warehouse::refresh`] to load it.
    pub fn new(runtime: &'a R, dir: PathBuf) -> Self {
        Self {
            runtime,
            dir,
            descriptors: Vec::new(),
        }
    }

    /// A warehouse over `dir`, already refreshed.
    pub fn open(runtime: &'a R, dir: PathBuf) -> Result<Self> {
        let mut warehouse = Self::new(runtime, dir);
        warehouse.refresh()?;
        Ok(warehouse)
    }

    pub fn runtime(&self) -> &'a R {
        self.runtime
    }

    /// The directory holding descriptor files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rebuild the index from the descriptor directory. Files that fail to
    /// parse are indexed as detached descriptors; files whose name is not a
    /// dependency key are skipped.
    #[tracing::instrument(skip(self))]
    pub fn refresh(&mut self) -> Result<()> {
        info!("Updating warehouse from {:?}", self.dir);
        let mut descriptors = Vec::new();

        if self.runtime.exists(&self.dir) {
            for path in self.runtime.read_dir(&self.dir)? {
                let is_descriptor = path
                    .extension()
                    .is_some_and(|ext| ext == DESCRIPTOR_EXTENSION);
                if !is_descriptor || self.runtime.is_dir(&path) {
                    debug!("Ignoring {:?}", path);
                    continue;
                }
                match PackageDescriptor::from_file(self.runtime, &path) {
                    Ok(descriptor) => descriptors.push(descriptor),
                    Err(e) => log::error!("Unable to index {:?}: {:#}", path, e),
                }
            }
        }

        debug!("Indexed {} descriptor(s)", descriptors.len());
        self.descriptors = descriptors;
        Ok(())
    }

    pub fn lookup(&self, key: &DependencyKey) -> Lookup<&PackageDescriptor> {
        match self.descriptors.iter().find(|d| d.key() == key) {
            Some(descriptor) => Lookup::Found(descriptor),
            None => Lookup::NotFound,
        }
    }

    /// Remove a descriptor from the index and hand it over.
    pub fn take(&mut self, key: &DependencyKey) -> Lookup<PackageDescriptor> {
        match self.descriptors.iter().position(|d| d.key() == key) {
            Some(index) => Lookup::Found(self.descriptors.remove(index)),
            None => Lookup::NotFound,
        }
    }

    pub fn descriptors(&self) -> &[PackageDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Delete every indexed package, then refresh.
    ///
    /// Packages still required when their turn comes are deleted later by the
    /// cascade from their last dependent. Returns false if any deletion was
    /// unclean.
    #[tracing::instrument(skip(self, refs))]
    pub fn delete_all(&mut self, refs: &mut ReferenceStore<'_, R>) -> Result<bool> {
        let keys: Vec<DependencyKey> = self.descriptors.iter().map(|d| d.key().clone()).collect();
        let mut clean = true;

        for key in keys {
            // Already taken by an earlier cascade.
            let Lookup::Found(mut descriptor) = self.take(&key) else {
                continue;
            };
            let outcome = descriptor.delete(refs, self);
            clean &= outcome.is_success();
            if descriptor.is_installed() {
                self.descriptors.push(descriptor);
            }
        }

        self.refresh()?;
        Ok(clean)
    }
}
