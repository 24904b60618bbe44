//! Manifest and catalogue parsing, build plan resolution, and release descriptors for Vessel.
//!
//! This crate defines the schema layer: the release manifest (`Manifest`, a
//! package → version pinning), the catalogue of buildable package versions
//! (`Catalogue`, `PackageSpec`), exact-match resolution of one against the other
//! (`resolve` → `BuildPlan`), and the provenance descriptor written into every
//! release (`ReleaseDoc`).

pub mod catalogue;
pub mod manifest;
pub mod plan;
pub mod release;
pub mod types;

pub use catalogue::{
    parse_catalogue_file, parse_catalogue_str, BuildMethod, Catalogue, FetchKind, PackageSpec,
};
pub use manifest::{parse_manifest_file, parse_manifest_str, Manifest, ManifestError};
pub use plan::{resolve, BuildPlan, ResolutionError};
pub use release::{ReleaseDoc, ReleaseEntry};
pub use types::{package_key, PackageName, Version};
