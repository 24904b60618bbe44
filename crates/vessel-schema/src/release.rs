use crate::manifest::ManifestError;
use crate::plan::BuildPlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Provenance record for one package in a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub version: String,
    pub maintainer: String,
}

/// The release descriptor written to `<release>/<release>`.
///
/// Purely informational: nothing reads it back during a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseDoc {
    pub packages: BTreeMap<String, ReleaseEntry>,
}

impl ReleaseDoc {
    pub fn from_plan(plan: &BuildPlan) -> Self {
        let packages = plan
            .iter()
            .map(|spec| {
                (
                    spec.name.to_string(),
                    ReleaseEntry {
                        version: spec.version.to_string(),
                        maintainer: spec.maintainer.clone(),
                    },
                )
            })
            .collect();
        Self { packages }
    }

    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        serde_yaml::to_string(self).map_err(|source| ManifestError::Yaml {
            what: "release descriptor".to_owned(),
            source,
        })
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let path = path.as_ref();
        let content = self.to_yaml()?;
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(ManifestError::Write)?;
        tmp.write_all(content.as_bytes())
            .map_err(ManifestError::Write)?;
        tmp.as_file().sync_all().map_err(ManifestError::Write)?;
        tmp.persist(path)
            .map_err(|e| ManifestError::Write(e.error))?;
        fs::File::open(dir)
            .and_then(|f| f.sync_all())
            .map_err(ManifestError::Write)?;
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            what: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ManifestError::Yaml {
            what: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::parse_catalogue_str;
    use crate::manifest::parse_manifest_str;
    use crate::plan::resolve;

    fn plan() -> BuildPlan {
        let catalogue =
            parse_catalogue_str("foo:\n  \"1.0\":\n    maintainer: a@x\n    make: pip\n", None)
                .unwrap();
        let manifest = parse_manifest_str("foo: \"1.0\"\n").unwrap();
        resolve(&manifest, &catalogue).unwrap()
    }

    #[test]
    fn descriptor_records_version_and_maintainer() {
        let doc = ReleaseDoc::from_plan(&plan());
        let entry = &doc.packages["foo"];
        assert_eq!(entry.version, "1.0");
        assert_eq!(entry.maintainer, "a@x");
    }

    #[test]
    fn version_stays_a_string_in_yaml() {
        let yaml = ReleaseDoc::from_plan(&plan()).to_yaml().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(value["foo"]["version"].as_str(), Some("1.0"));
        assert_eq!(value["foo"]["maintainer"].as_str(), Some("a@x"));
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024.01");
        let doc = ReleaseDoc::from_plan(&plan());
        doc.write_to_file(&path).unwrap();
        assert_eq!(ReleaseDoc::read_from_file(&path).unwrap(), doc);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("rel");
        let err = ReleaseDoc::default().write_to_file(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Write(_)));
    }
}
