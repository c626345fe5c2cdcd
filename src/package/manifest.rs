use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::runtime::Runtime;

use super::DependencyKey;

/// File name of the manifest shipped at the root of every package.
pub const MANIFEST_FILE: &str = "manifest.json";

/// The parts of a package's `manifest.json` that the manager keeps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub version_number: String,
    pub website_url: String,
    pub description: String,
    pub dependencies: Vec<DependencyKey>,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version_number: Option<String>,
    #[serde(default)]
    website_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dependencies: Option<Value>,
}

impl Manifest {
    /// Parse manifest JSON. Missing or null text fields become empty strings;
    /// a missing or non-array `dependencies` becomes an empty list and
    /// unusable entries inside it are dropped with a warning.
    pub fn parse(content: &str) -> Result<Self> {
        // Package tooling commonly writes a UTF-8 BOM.
        let content = content.trim_start_matches('\u{feff}');
        let raw: RawManifest = serde_json::from_str(content).context("Malformed manifest")?;

        let dependencies = match raw.dependencies {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => match s.parse::<DependencyKey>() {
                        Ok(key) => Some(key),
                        Err(e) => {
                            warn!("Skipping dependency {:?}: {}", s, e);
                            None
                        }
                    },
                    Value::Null => None,
                    other => {
                        warn!("Skipping non-string dependency entry {}", other);
                        None
                    }
                })
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                warn!("Ignoring malformed dependency list {}", other);
                Vec::new()
            }
        };

        Ok(Self {
            name: raw.name.unwrap_or_default(),
            version_number: raw.version_number.unwrap_or_default(),
            website_url: raw.website_url.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            dependencies,
        })
    }

    /// Read `manifest.json` from an extracted package folder.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, package_dir: &Path) -> Result<Self> {
        let path = package_dir.join(MANIFEST_FILE);
        let content = runtime
            .read_to_string(&path)
            .with_context(|| format!("Failed to read manifest {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse manifest {:?}", path))
    }
}
