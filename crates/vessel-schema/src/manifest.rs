use crate::types::{PackageName, Version};
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {what}: {source}")]
    Yaml {
        what: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{what} must be a mapping at the top level")]
    NotAMapping { what: String },
    #[error("{what}: key {key} is not a string or number")]
    InvalidKey { what: String, key: String },
    #[error("{what}: package '{package}' has no usable version (found {found})")]
    InvalidVersion {
        what: String,
        package: String,
        found: String,
    },
    #[error("{what}: package '{package}' is listed more than once")]
    DuplicatePackage { what: String, package: String },
    #[error("catalogue entry {package} {version} is invalid: {source}")]
    InvalidEntry {
        package: String,
        version: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("catalogue entry {package} {version} is invalid: {reason}")]
    InvalidSpec {
        package: String,
        version: String,
        reason: String,
    },
    #[error("failed to write release descriptor: {0}")]
    Write(#[source] std::io::Error),
}

/// Render a scalar YAML key or value as the string a user wrote.
///
/// Versions such as `1.0` are read by YAML as floats; they keep their textual
/// form as long as they survive float formatting, so quoting is still advised.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_mapping(input: &str, what: &str) -> Result<Mapping, ManifestError> {
    let value: Value = serde_yaml::from_str(input).map_err(|source| ManifestError::Yaml {
        what: what.to_owned(),
        source,
    })?;
    match value {
        Value::Mapping(m) => Ok(m),
        // An empty document is an empty release.
        Value::Null => Ok(Mapping::new()),
        _ => Err(ManifestError::NotAMapping {
            what: what.to_owned(),
        }),
    }
}

/// The package → version pinning for one release.
///
/// Entries keep the order they were written in; that order is only used for
/// display, never for build scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(PackageName, Version)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pin. Fails if the package is already pinned.
    pub fn insert(
        &mut self,
        name: impl Into<PackageName>,
        version: impl Into<Version>,
    ) -> Result<(), ManifestError> {
        let name = name.into();
        if self.version_of(&name).is_some() {
            return Err(ManifestError::DuplicatePackage {
                what: "manifest".to_owned(),
                package: name.into_inner(),
            });
        }
        self.entries.push((name, version.into()));
        Ok(())
    }

    pub fn version_of(&self, name: &str) -> Option<&Version> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackageName, &Version)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn parse_manifest_str(input: &str) -> Result<Manifest, ManifestError> {
    let mapping = parse_mapping(input, "manifest")?;
    let mut seen = HashSet::new();
    let mut manifest = Manifest::new();

    for (key, value) in &mapping {
        let name = scalar_to_string(key).ok_or_else(|| ManifestError::InvalidKey {
            what: "manifest".to_owned(),
            key: format!("{key:?}"),
        })?;
        let version = scalar_to_string(value).ok_or_else(|| ManifestError::InvalidVersion {
            what: "manifest".to_owned(),
            package: name.clone(),
            found: format!("{value:?}"),
        })?;
        if !seen.insert(name.clone()) {
            return Err(ManifestError::DuplicatePackage {
                what: "manifest".to_owned(),
                package: name,
            });
        }
        manifest.insert(name, version)?;
    }

    Ok(manifest)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        what: path.display().to_string(),
        source,
    })?;
    parse_manifest_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pinned_versions_in_order() {
        let manifest = parse_manifest_str(
            r#"
python: "3.8.6"
numpy: "1.19.2"
ert: "2.14.0"
"#,
        )
        .unwrap();
        assert_eq!(manifest.len(), 3);
        let names: Vec<&str> = manifest.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["python", "numpy", "ert"]);
        assert_eq!(manifest.version_of("numpy").unwrap(), "1.19.2");
    }

    #[test]
    fn numeric_versions_keep_textual_form() {
        let manifest = parse_manifest_str("foo: 1.0\nbar: 2\n").unwrap();
        assert_eq!(manifest.version_of("foo").unwrap(), "1.0");
        assert_eq!(manifest.version_of("bar").unwrap(), "2");
    }

    #[test]
    fn empty_document_is_empty_manifest() {
        let manifest = parse_manifest_str("").unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn rejects_non_mapping() {
        let err = parse_manifest_str("- foo\n- bar\n").unwrap_err();
        assert!(matches!(err, ManifestError::NotAMapping { .. }));
    }

    #[test]
    fn rejects_structured_version() {
        let err = parse_manifest_str("foo:\n  version: 1\n").unwrap_err();
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut manifest = Manifest::new();
        manifest.insert("foo", "1.0").unwrap();
        assert!(manifest.insert("foo", "2.0").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = parse_manifest_file("/nonexistent/vessel/manifest.yml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/vessel/manifest.yml"));
    }
}
