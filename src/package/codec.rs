//! Package descriptor file format.
//!
//! A descriptor is nine segments split by NUL:
//!
//! ```text
//! name\0\n version\0\n developer\0\n key\0\n description\0\n
//! website\0\n page\0\n dep1\ndep2...\0\n /path/one\n/path/two...
//! ```
//!
//! The newline written after each NUL becomes the first line of the following
//! segment. For scalar segments it is stripped; for the two list segments the
//! reader splits on newline and drops element 0, so an empty list reads back
//! as a single blank element that is then discarded as well.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use super::{DependencyKey, PackageInfo};

const SEGMENTS: usize = 9;

/// Everything a descriptor file records.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub info: PackageInfo,
    pub dependencies: Vec<DependencyKey>,
    pub files: Vec<PathBuf>,
}

pub fn encode(info: &PackageInfo, dependencies: &[DependencyKey], files: &[PathBuf]) -> String {
    let mut out = String::new();
    for value in [
        info.name.as_str(),
        info.version.as_str(),
        info.developer.as_str(),
        info.key.as_str(),
        info.description.as_str(),
        info.website_url.as_str(),
        info.package_url.as_str(),
    ] {
        out.push_str(&value.replace('\0', ""));
        out.push_str("\0\n");
    }

    let dependencies: Vec<&str> = dependencies.iter().map(DependencyKey::as_str).collect();
    out.push_str(&dependencies.join("\n"));
    out.push_str("\0\n");

    let files: Vec<String> = files
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    out.push_str(&files.join("\n"));
    out
}

pub fn decode(content: &str) -> Result<Record> {
    let segments: Vec<&str> = content.split('\0').collect();
    if segments.len() != SEGMENTS {
        bail!(
            "Expected {} segments in descriptor, found {}",
            SEGMENTS,
            segments.len()
        );
    }

    let scalar = |i: usize| -> String {
        let segment = segments[i];
        segment.strip_prefix('\n').unwrap_or(segment).to_string()
    };

    let key: DependencyKey = scalar(3)
        .parse()
        .context("Invalid dependency key segment")?;

    let dependencies = list(segments[7])
        .into_iter()
        .map(|line| {
            line.parse::<DependencyKey>()
                .with_context(|| format!("Invalid dependency {:?}", line))
        })
        .collect::<Result<Vec<_>>>()?;

    let files = list(segments[8]).into_iter().map(PathBuf::from).collect();

    Ok(Record {
        info: PackageInfo {
            name: scalar(0),
            version: scalar(1),
            developer: scalar(2),
            key,
            description: scalar(4),
            website_url: scalar(5),
            package_url: scalar(6),
        },
        dependencies,
        files,
    })
}

/// Split a list segment on newline and drop the leading placeholder line.
/// A lone blank remainder is how an empty list is written, so it reads back
/// as no entries.
fn list(segment: &str) -> Vec<&str> {
    let lines: Vec<&str> = segment.split('\n').skip(1).collect();
    match lines.as_slice() {
        [""] => Vec::new(),
        _ => lines,
    }
}
