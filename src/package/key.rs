use anyhow::{Result, bail};
use std::fmt;
use std::str::FromStr;

/// Identifies one package version, canonically `<developer>-<id>-<version>`.
///
/// The key joins the reference-count file, descriptor file names and manifest
/// dependency lists, so it must never contain the separators those formats
/// use: newline, NUL and `:`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyKey(String);

impl DependencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Text before the first `-`, or the whole key when there is none.
    pub fn developer(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// `(developer, id, version)` when the key has the canonical shape.
    pub fn parts(&self) -> Option<(&str, &str, &str)> {
        let mut parts = self.0.split('-');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(developer), Some(id), Some(version), None)
                if !developer.is_empty() && !id.is_empty() && !version.is_empty() =>
            {
                Some((developer, id, version))
            }
            _ => None,
        }
    }
}

impl FromStr for DependencyKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            bail!("Dependency key is empty");
        }
        if let Some(c) = s.chars().find(|c| matches!(c, '\n' | '\r' | '\0' | ':')) {
            bail!("Dependency key {:?} contains forbidden character {:?}", s, c);
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for DependencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
