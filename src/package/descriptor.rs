use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::runtime::{Runtime, move_file};

use super::codec;
use super::layout::{LayoutClassifier, build_install_map};
use super::{DependencyKey, Lookup, Manifest, ReferenceStore, Warehouse};

/// Extension of descriptor files in the descriptor directory.
pub const DESCRIPTOR_EXTENSION: &str = "lcmd";

/// Community page prefix used to build each package's page link.
pub const PACKAGE_PAGE_BASE: &str = "https://thunderstore.io/c/lethal-company/p";

/// Scalar fields describing one package version.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub developer: String,
    pub key: DependencyKey,
    pub description: String,
    pub website_url: String,
    pub package_url: String,
}

impl PackageInfo {
    /// Info known from the key alone, every other field empty.
    pub fn for_key(key: DependencyKey) -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            developer: key.developer().to_string(),
            key,
            description: String::new(),
            website_url: String::new(),
            package_url: String::new(),
        }
    }
}

/// Where a package's files are.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageState {
    /// Extracted but not installed: each payload file mapped to its install
    /// destination. An empty map means the layout was not recognised.
    Staged {
        source_dir: PathBuf,
        files: BTreeMap<PathBuf, PathBuf>,
    },
    /// Files are in place and recorded in a descriptor file.
    Installed { files: Vec<PathBuf> },
    /// Not installed and nothing to install: a descriptor file that did not
    /// parse, or a package that has been deleted.
    Detached,
}

/// Result of [`PackageDescriptor::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Files and descriptor were removed. `clean` is false when any single
    /// file or directory removal failed.
    Removed { clean: bool },
    /// Nothing was installed; nothing was done.
    NotInstalled,
    /// Other installed packages still require this one; nothing was done.
    StillRequired(u32),
}

impl DeleteOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            DeleteOutcome::Removed { clean } => *clean,
            DeleteOutcome::NotInstalled | DeleteOutcome::StillRequired(_) => true,
        }
    }
}

/// One package version, either staged from an extracted folder or loaded from
/// its descriptor file.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    info: PackageInfo,
    dependencies: Vec<DependencyKey>,
    state: PackageState,
}

impl PackageDescriptor {
    /// An installed descriptor built from its parts.
    pub fn installed(info: PackageInfo, dependencies: Vec<DependencyKey>, files: Vec<PathBuf>) -> Self {
        Self {
            info,
            dependencies,
            state: PackageState::Installed { files },
        }
    }

    /// Load a descriptor file. Content that cannot be parsed is logged and
    /// yields a [`PackageState::Detached`] descriptor keyed by the file name;
    /// only a file name that is not a dependency key is an error.
    #[tracing::instrument(skip(runtime))]
    pub fn from_file<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let key: DependencyKey = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Descriptor file name {:?} is not valid UTF-8", path))?
            .parse()
            .with_context(|| format!("Descriptor file name {:?} is not a dependency key", path))?;
        info!("Loading {} data", key);

        // Decoded lossily: a damaged byte in a free-text field must not cost
        // the key and file list.
        let parsed = runtime
            .read(path)
            .and_then(|bytes| Self::decode(&String::from_utf8_lossy(&bytes)));
        match parsed {
            Ok(descriptor) => {
                if descriptor.key() != &key {
                    warn!(
                        "Descriptor file {:?} records key {}",
                        path,
                        descriptor.key()
                    );
                }
                Ok(descriptor)
            }
            Err(e) => {
                error!("Error loading package from descriptor file {:?}: {:#}", path, e);
                Ok(Self {
                    info: PackageInfo::for_key(key),
                    dependencies: Vec::new(),
                    state: PackageState::Detached,
                })
            }
        }
    }

    /// Stage a package from its extracted folder.
    ///
    /// The folder name is the dependency key; failing to derive one is the
    /// only error. A missing or malformed manifest, or a layout no rule
    /// recognises, is logged and leaves the descriptor staged with an empty
    /// file map so the caller can point the user at the folder.
    #[tracing::instrument(skip(runtime, classifier))]
    pub fn from_extracted<R: Runtime>(
        runtime: &R,
        folder: &Path,
        classifier: &LayoutClassifier,
    ) -> Result<Self> {
        let key: DependencyKey = folder
            .file_name()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Can not generate package description from path {:?}", folder))?
            .parse()
            .with_context(|| format!("Folder name of {:?} is not a dependency key", folder))?;

        let mut descriptor = Self {
            info: PackageInfo::for_key(key),
            dependencies: Vec::new(),
            state: PackageState::Staged {
                source_dir: folder.to_path_buf(),
                files: BTreeMap::new(),
            },
        };

        let manifest = match Manifest::load(runtime, folder) {
            Ok(manifest) => manifest,
            Err(e) => {
                error!(
                    "Failed to load package description from extracted folder: {:#}",
                    e
                );
                return Ok(descriptor);
            }
        };

        descriptor.info.package_url = format!(
            "{}/{}/{}/",
            PACKAGE_PAGE_BASE, descriptor.info.developer, manifest.name
        );
        descriptor.info.name = manifest.name;
        descriptor.info.version = manifest.version_number;
        descriptor.info.website_url = manifest.website_url;
        descriptor.info.description = manifest.description;
        descriptor.dependencies = manifest.dependencies;

        let Some(placement) = classifier.classify(runtime, folder) else {
            error!(
                "Cannot determine install path for {}, manual intervention required",
                descriptor.key()
            );
            info!("Package can be found at: {:?}", folder);
            return Ok(descriptor);
        };

        match build_install_map(runtime, &placement.payload_dir, &placement.install_dir) {
            Ok(map) => {
                if map.is_empty() {
                    error!("Extracted package folder contains no files to install: {:?}", folder);
                }
                descriptor.state = PackageState::Staged {
                    source_dir: folder.to_path_buf(),
                    files: map,
                };
            }
            Err(e) => error!("Error determining install paths for {:?}: {:#}", folder, e),
        }

        Ok(descriptor)
    }

    /// Parse descriptor file content into an installed descriptor.
    pub fn decode(content: &str) -> Result<Self> {
        let record = codec::decode(content)?;
        Ok(Self::installed(record.info, record.dependencies, record.files))
    }

    /// Serialize into descriptor file content. Staged descriptors record their
    /// destination paths.
    pub fn encode(&self) -> String {
        codec::encode(&self.info, &self.dependencies, &self.install_paths())
    }

    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    pub fn key(&self) -> &DependencyKey {
        &self.info.key
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn dependencies(&self) -> &[DependencyKey] {
        &self.dependencies
    }

    pub fn state(&self) -> &PackageState {
        &self.state
    }

    pub fn is_installed(&self) -> bool {
        matches!(self.state, PackageState::Installed { .. })
    }

    /// Installed paths, or the pending destinations of a staged package.
    pub fn install_paths(&self) -> Vec<PathBuf> {
        match &self.state {
            PackageState::Installed { files } => files.clone(),
            PackageState::Staged { files, .. } => files.values().cloned().collect(),
            PackageState::Detached => Vec::new(),
        }
    }

    /// The staged source-to-destination map, if staged.
    pub fn install_map(&self) -> Option<&BTreeMap<PathBuf, PathBuf>> {
        match &self.state {
            PackageState::Staged { files, .. } => Some(files),
            _ => None,
        }
    }

    /// The extracted folder of a staged package.
    pub fn source_dir(&self) -> Option<&Path> {
        match &self.state {
            PackageState::Staged { source_dir, .. } => Some(source_dir),
            _ => None,
        }
    }

    /// Whether a staged package has any files to install.
    pub fn has_payload(&self) -> bool {
        self.install_map().is_some_and(|files| !files.is_empty())
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.info.key, DESCRIPTOR_EXTENSION)
    }

    /// Write the descriptor file into `dir`, creating it when missing.
    #[tracing::instrument(skip(self, runtime))]
    pub fn write<R: Runtime>(&self, runtime: &R, dir: &Path) -> Result<()> {
        let path = dir.join(self.file_name());
        debug!("Writing {:?}", path);
        if !runtime.exists(dir) {
            runtime.create_dir_all(dir)?;
        }
        runtime
            .write(&path, self.encode().as_bytes())
            .with_context(|| format!("Failed to write descriptor {:?}", path))
    }

    /// Move every staged file into place, record the package's dependency
    /// references and write its descriptor file into the warehouse directory.
    ///
    /// Stops at the first pair whose destination already exists or whose
    /// source is missing. Files moved before that point stay where they are;
    /// the error tells the caller which source folder still needs attention.
    /// Installing an installed descriptor does nothing and succeeds.
    #[tracing::instrument(skip_all, fields(key = %self.info.key))]
    pub fn install<R: Runtime>(
        &mut self,
        refs: &mut ReferenceStore<'_, R>,
        warehouse: &Warehouse<'_, R>,
    ) -> Result<()> {
        let runtime = warehouse.runtime();
        info!("Installing {}", self.key());

        let (source_dir, files) = match &self.state {
            PackageState::Installed { .. } => {
                warn!("Called to install {} when it is already installed", self.key());
                return Ok(());
            }
            PackageState::Detached => {
                error!("{} has no package data to install", self.key());
                bail!("{} has no package data to install", self.key());
            }
            PackageState::Staged { source_dir, files } => (source_dir.clone(), files.clone()),
        };

        if files.is_empty() {
            error!("Called to install {} when its folder has no files to install", self.key());
            bail!(
                "{} has no recognised files to install; the package is at {:?}",
                self.key(),
                source_dir
            );
        }

        for (source, dest) in &files {
            let parent = dest
                .parent()
                .with_context(|| format!("Install path {:?} has no parent directory", dest))?;
            runtime.create_dir_all(parent)?;

            if runtime.exists(dest) {
                warn!(
                    "Trying to install {:?} but {:?} already exists",
                    source, dest
                );
                bail!("Install destination {:?} already exists", dest);
            }
            if !runtime.exists(source) {
                error!("Source file {:?} is missing", source);
                bail!("Source file {:?} is missing", source);
            }

            move_file(runtime, source, dest)
                .with_context(|| format!("Failed to move {:?} to {:?}", source, dest))?;
        }

        info!("Deleting {} source folder", self.key());
        if let Err(e) = runtime.remove_dir_all(&source_dir) {
            error!("Failed to delete extracted folder {:?}: {:#}", source_dir, e);
        }

        for dependency in &self.dependencies {
            refs.increment(dependency);
        }

        self.state = PackageState::Installed {
            files: files.into_values().collect(),
        };
        self.write(runtime, warehouse.dir())
    }

    /// Remove the package's files and descriptor, release its dependency
    /// references and delete any dependency left with no references.
    ///
    /// Does nothing when the package is not installed or another installed
    /// package still requires it. Individual removal failures are logged and
    /// make the outcome unclean, but never stop the dependency cascade.
    /// Cascaded dependencies are taken out of `warehouse`.
    #[tracing::instrument(skip_all, fields(key = %self.info.key))]
    pub fn delete<R: Runtime>(
        &mut self,
        refs: &mut ReferenceStore<'_, R>,
        warehouse: &mut Warehouse<'_, R>,
    ) -> DeleteOutcome {
        let runtime = warehouse.runtime();
        info!("Deleting {} package files", self.key());

        let files = match &self.state {
            PackageState::Installed { files } => files.clone(),
            _ => {
                warn!("Called to delete {} when it is not installed", self.key());
                return DeleteOutcome::NotInstalled;
            }
        };

        let references = refs.count(self.key());
        if references > 0 {
            info!(
                "Called to delete {} while it still has {} reference(s), skipping",
                self.key(),
                references
            );
            return DeleteOutcome::StillRequired(references);
        }

        let mut clean = true;
        for path in &files {
            if let Err(e) = remove_if_present(runtime, path) {
                error!("Failed to delete file {:?}: {:#}", path, e);
                clean = false;
                continue;
            }

            let Some(parent) = path.parent() else {
                continue;
            };
            let is_empty = runtime
                .read_dir(parent)
                .map(|entries| entries.is_empty())
                .unwrap_or(false);
            if is_empty && let Err(e) = runtime.remove_dir(parent) {
                error!("Failed to delete directory {:?}: {:#}", parent, e);
                clean = false;
            }
        }

        let descriptor_path = warehouse.dir().join(self.file_name());
        if let Err(e) = remove_if_present(runtime, &descriptor_path) {
            error!("Failed to delete file {:?}: {:#}", descriptor_path, e);
            clean = false;
        }
        self.state = PackageState::Detached;

        if has_dependencies(&self.dependencies) {
            for dependency in &self.dependencies {
                refs.decrement(dependency);
            }

            let mut visited = BTreeSet::new();
            for dependency in &self.dependencies {
                // A key listed twice was already handled on its first entry.
                if !visited.insert(dependency) || refs.count(dependency) != 0 {
                    continue;
                }
                info!(
                    "Dependency {} has 0 references, sending delete request",
                    dependency
                );
                match warehouse.take(dependency) {
                    Lookup::Found(mut package) => {
                        let outcome = package.delete(refs, warehouse);
                        if !outcome.is_success() {
                            warn!("Dependency {} was only partly removed", dependency);
                        }
                    }
                    Lookup::NotFound => error!(
                        "Unable to find {} in warehouse for deletion as it has 0 references",
                        dependency
                    ),
                }
            }
        }

        DeleteOutcome::Removed { clean }
    }
}

/// An empty list, or one whose first entry is blank, means "no dependencies".
/// [`DependencyKey`] cannot be empty, so in practice only the empty list
/// reaches the blank case.
fn has_dependencies(dependencies: &[DependencyKey]) -> bool {
    dependencies
        .first()
        .is_some_and(|first| !first.as_str().is_empty())
}

fn remove_if_present<R: Runtime>(runtime: &R, path: &Path) -> Result<()> {
    if !runtime.exists(path) {
        debug!("{:?} is already gone", path);
        return Ok(());
    }
    runtime.remove_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::test_utils::Sandbox;
    use std::fs;

    fn key(s: &str) -> DependencyKey {
        s.parse().unwrap()
    }

    fn stores<'a>(
        runtime: &'a RealRuntime,
        sandbox: &Sandbox,
    ) -> (ReferenceStore<'a, RealRuntime>, Warehouse<'a, RealRuntime>) {
        (
            ReferenceStore::new(runtime, sandbox.paths.references_file()),
            Warehouse::new(runtime, sandbox.paths.descriptors_dir()),
        )
    }

    fn install(
        sandbox: &Sandbox,
        refs: &mut ReferenceStore<'_, RealRuntime>,
        warehouse: &Warehouse<'_, RealRuntime>,
        name: &str,
        dependencies: &[&str],
    ) -> PackageDescriptor {
        let folder = sandbox.stage(name, dependencies, &[&format!("{}.dll", name)]);
        let mut descriptor =
            PackageDescriptor::from_extracted(&RealRuntime, &folder, &sandbox.classifier())
                .unwrap();
        descriptor.install(refs, warehouse).unwrap();
        descriptor
    }

    #[test]
    fn test_from_extracted_reads_manifest_and_layout() {
        let sandbox = Sandbox::new();
        let folder = sandbox.stage(
            "bizzlemip-BiggerLobby-2.7.0",
            &["BepInEx-BepInExPack-5.4.2100"],
            &["plugins/BiggerLobby.dll", "plugins/lang/en.json", "README.md"],
        );

        let descriptor =
            PackageDescriptor::from_extracted(&RealRuntime, &folder, &sandbox.classifier())
                .unwrap();

        let info = descriptor.info();
        assert_eq!(info.key.as_str(), "bizzlemip-BiggerLobby-2.7.0");
        assert_eq!(info.developer, "bizzlemip");
        assert_eq!(info.name, "BiggerLobby");
        assert_eq!(info.version, "2.7.0");
        assert_eq!(info.website_url, "https://example.com/BiggerLobby");
        assert_eq!(
            info.package_url,
            "https://thunderstore.io/c/lethal-company/p/bizzlemip/BiggerLobby/"
        );
        assert_eq!(
            descriptor.dependencies(),
            &[key("BepInEx-BepInExPack-5.4.2100")]
        );
        assert!(!descriptor.is_installed());
        assert_eq!(descriptor.source_dir(), Some(folder.as_path()));

        let plugins = sandbox.game().join("BepInEx/plugins");
        let expected: BTreeMap<PathBuf, PathBuf> = BTreeMap::from([
            (
                folder.join("plugins/BiggerLobby.dll"),
                plugins.join("BiggerLobby.dll"),
            ),
            (
                folder.join("plugins/lang/en.json"),
                plugins.join("lang/en.json"),
            ),
        ]);
        assert_eq!(descriptor.install_map(), Some(&expected));
        assert!(descriptor.has_payload());
    }

    #[test]
    fn test_from_extracted_unknown_layout_has_empty_map() {
        let sandbox = Sandbox::new();
        let folder = sandbox.stage("A-Textures-1.0", &[], &["assets/wall.png"]);

        let descriptor =
            PackageDescriptor::from_extracted(&RealRuntime, &folder, &sandbox.classifier())
                .unwrap();

        assert_eq!(descriptor.name(), "Textures");
        assert_eq!(descriptor.install_map(), Some(&BTreeMap::new()));
        assert!(!descriptor.has_payload());
    }

    #[test]
    fn test_from_extracted_without_manifest_keeps_defaults() {
        let sandbox = Sandbox::new();
        let folder = sandbox.paths.downloads_dir().join("A-X-1.0");
        fs::create_dir_all(folder.join("plugins")).unwrap();
        fs::write(folder.join("plugins/X.dll"), b"x").unwrap();

        let descriptor =
            PackageDescriptor::from_extracted(&RealRuntime, &folder, &sandbox.classifier())
                .unwrap();

        assert_eq!(descriptor.info(), &PackageInfo::for_key(key("A-X-1.0")));
        assert!(descriptor.dependencies().is_empty());
        assert!(!descriptor.has_payload());
    }

    #[test]
    fn test_from_extracted_rejects_unusable_folder_name() {
        let sandbox = Sandbox::new();
        let folder = sandbox.paths.downloads_dir().join("bad:name");
        fs::create_dir_all(&folder).unwrap();

        let result =
            PackageDescriptor::from_extracted(&RealRuntime, &folder, &sandbox.classifier());
        assert!(result.is_err());
    }

    #[test]
    fn test_install_moves_files_and_records_package() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, warehouse) = stores(&runtime, &sandbox);
        let folder = sandbox.stage(
            "Dev-Mod-1.0",
            &["A-X-1.0", "B-Y-2.0"],
            &["plugins/Mod.dll", "config/Mod.cfg", "icon.png"],
        );
        let mut descriptor =
            PackageDescriptor::from_extracted(&runtime, &folder, &sandbox.classifier()).unwrap();

        descriptor.install(&mut refs, &warehouse).unwrap();

        let bepinex = sandbox.game().join("BepInEx");
        assert!(descriptor.is_installed());
        assert_eq!(
            descriptor.install_paths(),
            vec![bepinex.join("config/Mod.cfg"), bepinex.join("plugins/Mod.dll")]
        );
        assert_eq!(
            fs::read_to_string(bepinex.join("plugins/Mod.dll")).unwrap(),
            "Dev-Mod-1.0 plugins/Mod.dll"
        );
        assert!(!folder.exists());
        assert_eq!(refs.count(&key("A-X-1.0")), 1);
        assert_eq!(refs.count(&key("B-Y-2.0")), 1);

        let file = sandbox.paths.descriptors_dir().join("Dev-Mod-1.0.lcmd");
        let reloaded = PackageDescriptor::from_file(&runtime, &file).unwrap();
        assert_eq!(reloaded, descriptor);
    }

    #[test]
    fn test_install_twice_is_idempotent() {
        // Mock has no expectations: any file operation would panic.
        let runtime = MockRuntime::new();
        let mut refs = ReferenceStore::new(&runtime, PathBuf::from("/mm/.dependencies"));
        let warehouse = Warehouse::new(&runtime, PathBuf::from("/mm/mods"));
        let mut descriptor = PackageDescriptor::installed(
            PackageInfo::for_key(key("A-X-1.0")),
            vec![key("B-Y-2.0")],
            vec![PathBuf::from("/game/BepInEx/plugins/X.dll")],
        );

        descriptor.install(&mut refs, &warehouse).unwrap();

        assert!(descriptor.is_installed());
        assert_eq!(refs.count(&key("B-Y-2.0")), 0);
    }

    #[test]
    fn test_install_stops_at_first_existing_destination() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, warehouse) = stores(&runtime, &sandbox);
        let folder = sandbox.stage("Dev-Mod-1.0", &["A-X-1.0"], &["a.dll", "b.dll", "c.dll"]);
        let plugins = sandbox.game().join("BepInEx/plugins");
        fs::create_dir_all(&plugins).unwrap();
        fs::write(plugins.join("b.dll"), b"someone else's").unwrap();
        let mut descriptor =
            PackageDescriptor::from_extracted(&runtime, &folder, &sandbox.classifier()).unwrap();

        let err = descriptor.install(&mut refs, &warehouse).unwrap_err();

        assert!(err.to_string().contains("already exists"));
        // a.dll moved before the failure and stays moved.
        assert!(plugins.join("a.dll").exists());
        assert!(!folder.join("a.dll").exists());
        // b.dll and c.dll were never touched.
        assert_eq!(fs::read(plugins.join("b.dll")).unwrap(), b"someone else's");
        assert!(folder.join("b.dll").exists());
        assert!(folder.join("c.dll").exists());
        assert!(!plugins.join("c.dll").exists());

        assert!(!descriptor.is_installed());
        assert_eq!(descriptor.source_dir(), Some(folder.as_path()));
        assert_eq!(refs.count(&key("A-X-1.0")), 0);
        assert!(!sandbox.paths.descriptors_dir().join("Dev-Mod-1.0.lcmd").exists());
    }

    #[test]
    fn test_install_fails_on_missing_source() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, warehouse) = stores(&runtime, &sandbox);
        let folder = sandbox.stage("Dev-Mod-1.0", &[], &["a.dll"]);
        let mut descriptor =
            PackageDescriptor::from_extracted(&runtime, &folder, &sandbox.classifier()).unwrap();
        fs::remove_file(folder.join("a.dll")).unwrap();

        let err = descriptor.install(&mut refs, &warehouse).unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(!descriptor.is_installed());
    }

    #[test]
    fn test_install_without_payload_fails() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, warehouse) = stores(&runtime, &sandbox);
        let folder = sandbox.stage("A-Textures-1.0", &["A-X-1.0"], &["assets/wall.png"]);
        let mut descriptor =
            PackageDescriptor::from_extracted(&runtime, &folder, &sandbox.classifier()).unwrap();

        assert!(descriptor.install(&mut refs, &warehouse).is_err());
        assert!(folder.join("assets/wall.png").exists());
        assert_eq!(refs.count(&key("A-X-1.0")), 0);
    }

    #[test]
    fn test_delete_removes_files_parent_dirs_and_descriptor() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);
        let folder = sandbox.stage(
            "Dev-Mod-1.0",
            &[],
            &["plugins/Mod/Mod.dll", "config/Mod.cfg"],
        );
        let config = sandbox.game().join("BepInEx/config");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join("other.cfg"), b"keep").unwrap();
        let mut descriptor =
            PackageDescriptor::from_extracted(&runtime, &folder, &sandbox.classifier()).unwrap();
        descriptor.install(&mut refs, &warehouse).unwrap();

        let outcome = descriptor.delete(&mut refs, &mut warehouse);

        assert_eq!(outcome, DeleteOutcome::Removed { clean: true });
        assert!(outcome.is_success());
        assert!(!descriptor.is_installed());
        let plugins = sandbox.game().join("BepInEx/plugins");
        assert!(!plugins.join("Mod").exists());
        assert!(plugins.exists());
        assert!(!config.join("Mod.cfg").exists());
        assert!(config.join("other.cfg").exists());
        assert!(!sandbox.paths.descriptors_dir().join("Dev-Mod-1.0.lcmd").exists());
    }

    #[test]
    fn test_delete_not_installed_is_noop_success() {
        let runtime = MockRuntime::new();
        let mut refs = ReferenceStore::new(&runtime, PathBuf::from("/mm/.dependencies"));
        let mut warehouse = Warehouse::new(&runtime, PathBuf::from("/mm/mods"));
        let mut descriptor = PackageDescriptor {
            info: PackageInfo::for_key(key("A-X-1.0")),
            dependencies: vec![],
            state: PackageState::Detached,
        };

        let outcome = descriptor.delete(&mut refs, &mut warehouse);
        assert_eq!(outcome, DeleteOutcome::NotInstalled);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_delete_still_required_is_noop_success() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);
        let mut shared = install(&sandbox, &mut refs, &warehouse, "A-X-1.0", &[]);
        install(&sandbox, &mut refs, &warehouse, "Dev-Mod-1.0", &["A-X-1.0"]);

        let outcome = shared.delete(&mut refs, &mut warehouse);

        assert_eq!(outcome, DeleteOutcome::StillRequired(1));
        assert!(outcome.is_success());
        assert!(shared.is_installed());
        assert!(sandbox.game().join("BepInEx/plugins/A-X-1.0.dll").exists());
    }

    #[test]
    fn test_shared_dependency_is_deleted_by_last_dependent() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);
        let shared_key = key("A-X-1.0");
        let shared_dll = sandbox.game().join("BepInEx/plugins/A-X-1.0.dll");

        install(&sandbox, &mut refs, &warehouse, "A-X-1.0", &[]);
        let mut d1 = install(&sandbox, &mut refs, &warehouse, "Dev-One-1.0", &["A-X-1.0"]);
        let mut d2 = install(&sandbox, &mut refs, &warehouse, "Dev-Two-1.0", &["A-X-1.0"]);
        assert_eq!(refs.count(&shared_key), 2);

        warehouse.refresh().unwrap();
        assert_eq!(d1.delete(&mut refs, &mut warehouse), DeleteOutcome::Removed { clean: true });
        assert_eq!(refs.count(&shared_key), 1);
        assert!(shared_dll.exists());
        assert!(warehouse.lookup(&shared_key).is_found());

        warehouse.refresh().unwrap();
        assert_eq!(d2.delete(&mut refs, &mut warehouse), DeleteOutcome::Removed { clean: true });
        assert_eq!(refs.count(&shared_key), 0);
        assert!(!shared_dll.exists());
        assert!(!sandbox.paths.descriptors_dir().join("A-X-1.0.lcmd").exists());

        warehouse.refresh().unwrap();
        assert!(warehouse.is_empty());
        assert_eq!(fs::read_to_string(sandbox.paths.references_file()).unwrap(), "");
    }

    #[test]
    fn test_cascade_recurses_through_dependency_chain() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);

        install(&sandbox, &mut refs, &warehouse, "Base-Loader-1.0", &[]);
        install(&sandbox, &mut refs, &warehouse, "Lib-Api-2.0", &["Base-Loader-1.0"]);
        let mut top = install(&sandbox, &mut refs, &warehouse, "Dev-Mod-1.0", &["Lib-Api-2.0"]);
        warehouse.refresh().unwrap();

        top.delete(&mut refs, &mut warehouse);

        let plugins = sandbox.game().join("BepInEx/plugins");
        assert!(!plugins.join("Lib-Api-2.0.dll").exists());
        assert!(!plugins.join("Base-Loader-1.0.dll").exists());
        assert_eq!(refs.len(), 0);
        warehouse.refresh().unwrap();
        assert!(warehouse.is_empty());
    }

    #[test]
    fn test_cascade_missing_from_warehouse_continues() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);
        let mut top = install(
            &sandbox,
            &mut refs,
            &warehouse,
            "Dev-Mod-1.0",
            &["Gone-Lib-1.0", "Also-Gone-1.0"],
        );

        let outcome = top.delete(&mut refs, &mut warehouse);

        assert_eq!(outcome, DeleteOutcome::Removed { clean: true });
        assert!(refs.is_empty());
    }

    #[test]
    fn test_header_only_dependency_list_parses_empty_and_skips_cascade() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);
        refs.increment(&key("Other-Lib-1.0"));

        let installed_file = sandbox.game().join("BepInEx/plugins/X.dll");
        fs::create_dir_all(installed_file.parent().unwrap()).unwrap();
        fs::write(&installed_file, b"x").unwrap();
        let file = sandbox.paths.descriptors_dir().join("A-X-1.0.lcmd");
        fs::write(
            &file,
            format!(
                "X\0\n1.0\0\nA\0\nA-X-1.0\0\n\0\n\0\n\0\n\0\n{}",
                installed_file.display()
            ),
        )
        .unwrap();

        let mut descriptor = PackageDescriptor::from_file(&runtime, &file).unwrap();
        assert!(descriptor.is_installed());
        assert!(descriptor.dependencies().is_empty());
        assert_eq!(descriptor.install_paths(), vec![installed_file.clone()]);

        let outcome = descriptor.delete(&mut refs, &mut warehouse);

        assert_eq!(outcome, DeleteOutcome::Removed { clean: true });
        assert!(!installed_file.exists());
        assert!(!file.exists());
        assert_eq!(refs.count(&key("Other-Lib-1.0")), 1);
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_has_dependencies_requires_a_first_entry() {
        assert!(!has_dependencies(&[]));
        assert!(has_dependencies(&[key("A-X-1.0")]));
    }

    #[test]
    fn test_damaged_free_text_still_deletes() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);

        let installed_file = sandbox.game().join("BepInEx/plugins/X.dll");
        fs::create_dir_all(installed_file.parent().unwrap()).unwrap();
        fs::write(&installed_file, b"x").unwrap();
        let file = sandbox.paths.descriptors_dir().join("A-X-1.0.lcmd");
        let mut content = b"X\0\n1.0\0\nA\0\nA-X-1.0\0\ncaf\xc3\0\n\0\n\0\n\0\n".to_vec();
        content.extend_from_slice(installed_file.to_string_lossy().as_bytes());
        fs::write(&file, content).unwrap();

        let mut descriptor = PackageDescriptor::from_file(&runtime, &file).unwrap();
        assert!(descriptor.is_installed());
        assert_eq!(descriptor.key(), &key("A-X-1.0"));
        assert_eq!(descriptor.install_paths(), vec![installed_file.clone()]);

        let outcome = descriptor.delete(&mut refs, &mut warehouse);

        assert_eq!(outcome, DeleteOutcome::Removed { clean: true });
        assert!(!installed_file.exists());
        assert!(!file.exists());
    }

    #[test_log::test]
    fn test_duplicate_dependency_cascades_once() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);
        install(&sandbox, &mut refs, &warehouse, "A-X-1.0", &[]);
        let mut top = install(
            &sandbox,
            &mut refs,
            &warehouse,
            "Dev-Mod-1.0",
            &["A-X-1.0", "A-X-1.0"],
        );
        assert_eq!(refs.count(&key("A-X-1.0")), 2);
        warehouse.refresh().unwrap();

        let outcome = top.delete(&mut refs, &mut warehouse);

        assert_eq!(outcome, DeleteOutcome::Removed { clean: true });
        assert!(refs.is_empty());
        assert!(!sandbox.game().join("BepInEx/plugins/A-X-1.0.dll").exists());
        assert!(!sandbox.paths.descriptors_dir().join("A-X-1.0.lcmd").exists());
        // Only Dev-Mod remains indexed; A-X-1.0 was taken by the cascade once.
        assert_eq!(warehouse.len(), 1);
        assert!(warehouse.lookup(&key("Dev-Mod-1.0")).is_found());
    }

    #[test]
    fn test_delete_failure_is_unclean_but_cascade_proceeds() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime.expect_write().returning(|_, _| Ok(()));
        runtime.expect_remove_file().returning(|path| {
            if path.ends_with("X.dll") {
                Err(anyhow::anyhow!("file in use"))
            } else {
                Ok(())
            }
        });
        runtime.expect_read_dir().never();

        let mut refs = ReferenceStore::new(&runtime, PathBuf::from("/mm/.dependencies"));
        refs.increment(&key("Lib-A-1.0"));
        let mut warehouse = Warehouse::new(&runtime, PathBuf::from("/mm/mods"));
        let mut descriptor = PackageDescriptor::installed(
            PackageInfo::for_key(key("Dev-X-1.0")),
            vec![key("Lib-A-1.0")],
            vec![PathBuf::from("/game/BepInEx/plugins/X.dll")],
        );

        let outcome = descriptor.delete(&mut refs, &mut warehouse);

        assert_eq!(outcome, DeleteOutcome::Removed { clean: false });
        assert!(!outcome.is_success());
        assert_eq!(refs.count(&key("Lib-A-1.0")), 0);
    }

    #[test]
    fn test_unparseable_descriptor_file_is_detached() {
        let sandbox = Sandbox::new();
        let runtime = RealRuntime;
        let (mut refs, mut warehouse) = stores(&runtime, &sandbox);
        let file = sandbox.paths.descriptors_dir().join("A-X-1.0.lcmd");
        fs::write(&file, "torn\0write").unwrap();

        let mut descriptor = PackageDescriptor::from_file(&runtime, &file).unwrap();

        assert_eq!(descriptor.key(), &key("A-X-1.0"));
        assert_eq!(descriptor.state(), &PackageState::Detached);
        assert!(!descriptor.is_installed());
        assert!(descriptor.install(&mut refs, &warehouse).is_err());
        assert_eq!(
            descriptor.delete(&mut refs, &mut warehouse),
            DeleteOutcome::NotInstalled
        );
        assert!(file.exists());
    }

    #[test]
    fn test_staged_descriptor_encodes_destinations() {
        let sandbox = Sandbox::new();
        let folder = sandbox.stage("Dev-Mod-1.0", &[], &["Mod.dll"]);
        let descriptor =
            PackageDescriptor::from_extracted(&RealRuntime, &folder, &sandbox.classifier())
                .unwrap();

        let decoded = PackageDescriptor::decode(&descriptor.encode()).unwrap();
        assert_eq!(
            decoded.install_paths(),
            vec![sandbox.game().join("BepInEx/plugins/Mod.dll")]
        );
        assert_eq!(decoded.info(), descriptor.info());
    }
}
