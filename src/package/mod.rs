//! Package management module
//!
//! Tracks which installed files belong to which package version and how many
//! installed packages require each dependency:
//!
//! - [`ReferenceStore`] - persisted dependency reference counts
//! - [`PackageDescriptor`] - one package version; installs and deletes itself
//! - [`Warehouse`] - index of installed descriptors, used by cascading delete

mod codec;
mod descriptor;
mod key;
pub mod layout;
mod manifest;
mod refs;
mod warehouse;

pub use descriptor::{
    DESCRIPTOR_EXTENSION, DeleteOutcome, PACKAGE_PAGE_BASE, PackageDescriptor, PackageInfo,
    PackageState,
};
pub use key::DependencyKey;
pub use layout::LayoutClassifier;
pub use manifest::{MANIFEST_FILE, Manifest};
pub use refs::ReferenceStore;
pub use warehouse::{Lookup, Warehouse};
