//! Recognising how an extracted package is laid out and where its files go.
//!
//! Layouts are an ordered list of [`LayoutRule`]s. Each rule pairs a probe on
//! the extracted folder with a placement: which folder holds the payload and
//! which directory under the game root receives it. The first rule whose
//! probe matches wins.

use anyhow::Result;
use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Files shipped with packages that are never installed.
pub const SKIPPED_FILES: &[&str] = &["manifest.json", "CHANGELOG.md", "README.md", "icon.png"];

/// What a rule looks for in the extracted folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// A subfolder with this exact name.
    Dir(&'static str),
    /// Any one of these subfolders.
    AnyDir(&'static [&'static str]),
    /// A file with this extension directly in the folder.
    RootFileWithExtension(&'static str),
}

/// Which folder's contents make up the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// The extracted folder itself.
    Folder,
    /// A named subfolder of the extracted folder.
    Subfolder(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRule {
    pub name: &'static str,
    pub probe: Probe,
    pub payload: Payload,
    /// Install directory, as path segments under the game directory.
    pub target: &'static [&'static str],
}

/// Layouts understood out of the box, in evaluation order.
pub const DEFAULT_RULES: &[LayoutRule] = &[
    LayoutRule {
        name: "loader-pack",
        probe: Probe::Dir("BepInExPack"),
        payload: Payload::Subfolder("BepInExPack"),
        target: &[],
    },
    LayoutRule {
        name: "loader-tree",
        probe: Probe::Dir("BepInEx"),
        payload: Payload::Folder,
        target: &[],
    },
    LayoutRule {
        name: "plugins-tree",
        probe: Probe::Dir("plugins"),
        payload: Payload::Folder,
        target: &["BepInEx"],
    },
    LayoutRule {
        name: "input-utils",
        probe: Probe::Dir("LethalCompanyInputUtils"),
        payload: Payload::Subfolder("LethalCompanyInputUtils"),
        target: &["BepInEx", "plugins"],
    },
    LayoutRule {
        name: "config-or-patchers",
        probe: Probe::AnyDir(&["config", "patchers"]),
        payload: Payload::Folder,
        target: &["BepInEx"],
    },
    LayoutRule {
        name: "bare-plugin",
        probe: Probe::RootFileWithExtension("dll"),
        payload: Payload::Folder,
        target: &["BepInEx", "plugins"],
    },
];

/// Where a matched package's payload comes from and goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub rule: &'static str,
    pub payload_dir: PathBuf,
    pub install_dir: PathBuf,
}

pub struct LayoutClassifier {
    game_dir: PathBuf,
    rules: Vec<LayoutRule>,
}

impl LayoutClassifier {
    /// Classifier with [`DEFAULT_RULES`] installing under `game_dir`.
    pub fn new(game_dir: impl Into<PathBuf>) -> Self {
        Self::with_rules(game_dir, DEFAULT_RULES.to_vec())
    }

    pub fn with_rules(game_dir: impl Into<PathBuf>, rules: Vec<LayoutRule>) -> Self {
        Self {
            game_dir: game_dir.into(),
            rules,
        }
    }

    /// Append a rule, evaluated after all existing ones.
    pub fn push(&mut self, rule: LayoutRule) {
        self.rules.push(rule);
    }

    pub fn game_dir(&self) -> &Path {
        &self.game_dir
    }

    pub fn rules(&self) -> &[LayoutRule] {
        &self.rules
    }

    /// Find the first rule matching `folder`.
    #[tracing::instrument(skip(self, runtime))]
    pub fn classify<R: Runtime>(&self, runtime: &R, folder: &Path) -> Option<Placement> {
        let rule = self
            .rules
            .iter()
            .find(|rule| probe_matches(runtime, &rule.probe, folder))?;
        debug!("{:?} matches layout {}", folder, rule.name);

        let payload_dir = match rule.payload {
            Payload::Folder => folder.to_path_buf(),
            Payload::Subfolder(name) => folder.join(name),
        };
        let install_dir = rule
            .target
            .iter()
            .fold(self.game_dir.clone(), |dir, segment| dir.join(segment));

        Some(Placement {
            rule: rule.name,
            payload_dir,
            install_dir,
        })
    }
}

fn probe_matches<R: Runtime>(runtime: &R, probe: &Probe, folder: &Path) -> bool {
    match probe {
        Probe::Dir(name) => runtime.is_dir(&folder.join(name)),
        Probe::AnyDir(names) => names.iter().any(|name| runtime.is_dir(&folder.join(name))),
        Probe::RootFileWithExtension(ext) => runtime
            .read_dir(folder)
            .map(|entries| {
                entries.iter().any(|entry| {
                    entry
                        .extension()
                        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
                        && !runtime.is_dir(entry)
                })
            })
            .unwrap_or(false),
    }
}

/// Map every payload file under `source_dir` to its destination under
/// `dest_dir`, recursing into subfolders and leaving out [`SKIPPED_FILES`].
pub fn build_install_map<R: Runtime>(
    runtime: &R,
    source_dir: &Path,
    dest_dir: &Path,
) -> Result<BTreeMap<PathBuf, PathBuf>> {
    let mut map = BTreeMap::new();
    walk(runtime, source_dir, dest_dir, &mut map)?;
    Ok(map)
}

fn walk<R: Runtime>(
    runtime: &R,
    source_dir: &Path,
    dest_dir: &Path,
    map: &mut BTreeMap<PathBuf, PathBuf>,
) -> Result<()> {
    let entries = runtime.read_dir(source_dir)?;
    let (dirs, files): (Vec<_>, Vec<_>) = entries.into_iter().partition(|p| runtime.is_dir(p));

    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        if SKIPPED_FILES.iter().any(|skip| name == *skip) {
            debug!("Skipping non-payload file {:?}", file);
            continue;
        }
        let dest = dest_dir.join(name);
        map.insert(file, dest);
    }

    for dir in dirs {
        let Some(name) = dir.file_name() else {
            continue;
        };
        let nested_dest = dest_dir.join(name);
        walk(runtime, &dir, &nested_dest, map)?;
    }

    Ok(())
}
