//! Persisted reference counts for installed dependency keys.
//!
//! File format: one `<key>:<count>` entry per line, newline-joined, with no
//! trailing newline. Readers skip malformed lines individually because writes
//! are not atomic and a crash can leave a torn file behind.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

use super::DependencyKey;

/// How many installed packages currently require each dependency key.
///
/// A present key always has a count of at least 1; dropping to zero removes
/// the entry. Every mutation is written through to the backing file, reads
/// never touch it.
pub struct ReferenceStore<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
    counts: BTreeMap<DependencyKey, u32>,
}

impl<'a, R: Runtime> ReferenceStore<'a, R> {
    /// Create an empty store backed by `path`. Nothing is read or written.
    pub fn new(runtime: &'a R, path: PathBuf) -> Self {
        Self {
            runtime,
            path,
            counts: BTreeMap::new(),
        }
    }

    /// Create a store backed by `path` and load whatever it currently holds.
    pub fn open(runtime: &'a R, path: PathBuf) -> Result<Self> {
        let mut store = Self::new(runtime, path);
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add one reference, creating the entry at 1 when absent.
    pub fn increment(&mut self, key: &DependencyKey) {
        info!("Adding {:?} reference", key.as_str());
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        self.persist();
    }

    /// Drop one reference. Absent keys are left alone with a warning; an entry
    /// at 1 is removed instead of being stored as zero.
    pub fn decrement(&mut self, key: &DependencyKey) {
        info!("Removing {:?} reference", key.as_str());
        match self.counts.get_mut(key) {
            None => {
                warn!(
                    "Attempted to remove {:?} reference when it does not exist",
                    key.as_str()
                );
                return;
            }
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.counts.remove(key);
            }
        }
        self.persist();
    }

    /// Current count for `key`, 0 when absent.
    pub fn count(&self, key: &DependencyKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Persist the current counts, then empty the store in memory.
    ///
    /// The file keeps that last snapshot until the next mutation writes again.
    pub fn clear(&mut self) {
        info!("Clearing dependency references");
        self.persist();
        self.counts.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DependencyKey, u32)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Write every entry to the backing file, creating its directory if needed.
    #[tracing::instrument(skip(self))]
    pub fn save(&self) -> Result<()> {
        debug!("Writing references to {:?}", self.path);
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime.create_dir_all(parent)?;
        }
        self.runtime
            .write(&self.path, encode(&self.counts).as_bytes())
            .with_context(|| format!("Failed to save references to {:?}", self.path))
    }

    /// Replace the in-memory counts with the backing file's contents.
    ///
    /// A missing file leaves the store untouched. Malformed lines are logged
    /// and skipped.
    #[tracing::instrument(skip(self))]
    pub fn load(&mut self) -> Result<()> {
        debug!("Reading references from {:?}", self.path);
        if !self.runtime.exists(&self.path) {
            warn!("Dependencies file does not exist: {:?}", self.path);
            return Ok(());
        }
        let content = self.runtime.read(&self.path)?;
        self.counts = decode(&content);
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            error!("Unable to write references: {:#}", e);
        }
    }
}

/// Render counts in the `<key>:<count>` line format.
pub fn encode(counts: &BTreeMap<DependencyKey, u32>) -> String {
    counts
        .iter()
        .map(|(key, count)| format!("{}:{}", key, count))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the `<key>:<count>` line format, skipping entries that do not parse.
/// Lines are decoded one at a time so invalid UTF-8 only costs that line.
/// Repeated keys are summed.
pub fn decode(content: &[u8]) -> BTreeMap<DependencyKey, u32> {
    let mut counts = BTreeMap::new();
    for line in content.split(|b| *b == b'\n') {
        let entry = match std::str::from_utf8(line) {
            Ok(entry) => entry.trim_end_matches('\r'),
            Err(e) => {
                error!(
                    "Unable to deserialize entry {:?}: {}",
                    String::from_utf8_lossy(line),
                    e
                );
                continue;
            }
        };
        if entry.is_empty() {
            continue;
        }
        match parse_entry(entry) {
            Ok((key, count)) => {
                let slot = counts.entry(key).or_insert(0u32);
                *slot = slot.saturating_add(count);
            }
            Err(e) => error!("Unable to deserialize entry {:?}: {:#}", entry, e),
        }
    }
    counts
}

fn parse_entry(entry: &str) -> Result<(DependencyKey, u32)> {
    let (key, count) = entry
        .split_once(':')
        .context("missing ':' separator")?;
    let key: DependencyKey = key.parse()?;
    let count: u32 = count
        .trim()
        .parse()
        .with_context(|| format!("invalid count {:?}", count))?;
    if count == 0 {
        anyhow::bail!("zero count");
    }
    Ok((key, count))
}
