use crate::catalogue::{BuildMethod, Catalogue, PackageSpec};
use crate::manifest::Manifest;
use crate::types::{PackageName, Version};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("package '{name}' (pinned to {version}) is not in the catalogue")]
    UnknownPackage { name: String, version: String },
    #[error("package '{name}' has no catalogue entry for version {version} (available: {available})")]
    UnknownVersion {
        name: String,
        version: String,
        available: String,
    },
}

/// The manifest resolved against the catalogue: one spec per manifest entry,
/// in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildPlan {
    entries: Vec<PackageSpec>,
}

impl BuildPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackageSpec> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&PackageSpec> {
        self.entries.iter().find(|s| s.name == name)
    }

    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.get(name).map(|s| &s.version)
    }

    pub fn contains(&self, name: &PackageName) -> bool {
        self.get(name).is_some()
    }

    /// Entries whose build output embeds the interpreter and must be redone
    /// against the installed tree.
    pub fn interpreter_dependent(&self) -> impl Iterator<Item = &PackageSpec> {
        self.entries
            .iter()
            .filter(|s| s.build_method.embeds_interpreter())
    }

    pub fn with_method(&self, method: BuildMethod) -> impl Iterator<Item = &PackageSpec> {
        self.entries.iter().filter(move |s| s.build_method == method)
    }
}

impl<'a> IntoIterator for &'a BuildPlan {
    type Item = &'a PackageSpec;
    type IntoIter = std::slice::Iter<'a, PackageSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Look up every pinned `(name, version)` in the catalogue. Exact matches only.
pub fn resolve(manifest: &Manifest, catalogue: &Catalogue) -> Result<BuildPlan, ResolutionError> {
    let mut entries = Vec::with_capacity(manifest.len());
    for (name, version) in manifest.iter() {
        let versions = catalogue
            .versions(name)
            .ok_or_else(|| ResolutionError::UnknownPackage {
                name: name.to_string(),
                version: version.to_string(),
            })?;
        let spec = versions
            .get(version)
            .ok_or_else(|| ResolutionError::UnknownVersion {
                name: name.to_string(),
                version: version.to_string(),
                available: versions
                    .keys()
                    .map(Version::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;
        entries.push(spec.clone());
    }
    Ok(BuildPlan { entries })
}
