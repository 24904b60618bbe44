use crate::manifest::{parse_mapping, scalar_to_string, ManifestError};
use crate::types::{PackageName, Version};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// How a package is built. The set is closed: each variant has exactly one
/// build backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildMethod {
    Cmake,
    Pip,
    Sh,
    Rsync,
    Noop,
}

impl BuildMethod {
    /// Whether installed scripts embed the interpreter path used at build time.
    pub fn embeds_interpreter(self) -> bool {
        matches!(self, BuildMethod::Pip)
    }
}

impl fmt::Display for BuildMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMethod::Cmake => write!(f, "cmake"),
            BuildMethod::Pip => write!(f, "pip"),
            BuildMethod::Sh => write!(f, "sh"),
            BuildMethod::Rsync => write!(f, "rsync"),
            BuildMethod::Noop => write!(f, "noop"),
        }
    }
}

/// Where a package's artifact comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FetchKind {
    /// Clone `source` and check out the pinned version as a revision.
    Git,
    /// Download the pinned distribution from the package index, without dependencies.
    Pip,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchKind::Git => write!(f, "git"),
            FetchKind::Pip => write!(f, "pip"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawOptions {
    Line(String),
    List(Vec<String>),
}

impl RawOptions {
    fn into_args(self) -> Vec<String> {
        match self {
            RawOptions::Line(line) => line.split_whitespace().map(str::to_owned).collect(),
            RawOptions::List(list) => list,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    maintainer: String,
    #[serde(alias = "buildMethod", alias = "build_method")]
    make: BuildMethod,
    #[serde(default, alias = "buildOptions", alias = "build_options")]
    makeopts: Option<RawOptions>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    fetch: Option<FetchKind>,
    #[serde(default, alias = "dependencies")]
    depends: Vec<String>,
    #[serde(default)]
    makefile: Option<String>,
}

/// Everything needed to obtain and build one pinned package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSpec {
    pub name: PackageName,
    pub version: Version,
    pub maintainer: String,
    pub build_method: BuildMethod,
    /// Forwarded verbatim to the underlying build tool.
    pub build_options: Vec<String>,
    pub depends: Vec<PackageName>,
    pub source: Option<String>,
    pub fetch: Option<FetchKind>,
    /// Build script for the `sh` method, resolved against the catalogue's directory.
    pub makefile: Option<PathBuf>,
}

impl PackageSpec {
    fn from_raw(
        name: PackageName,
        version: Version,
        raw: RawEntry,
        base_dir: Option<&Path>,
    ) -> Result<Self, ManifestError> {
        let fetch = raw
            .fetch
            .or_else(|| infer_fetch(raw.make, raw.source.as_deref()));

        if fetch == Some(FetchKind::Git) && raw.source.is_none() {
            return Err(ManifestError::InvalidSpec {
                package: name.into_inner(),
                version: version.into_inner(),
                reason: "git fetch requires a source URL".to_owned(),
            });
        }
        if raw.make == BuildMethod::Sh && raw.makefile.is_none() {
            return Err(ManifestError::InvalidSpec {
                package: name.into_inner(),
                version: version.into_inner(),
                reason: "sh builds require a makefile".to_owned(),
            });
        }

        let makefile = raw.makefile.map(|m| {
            let path = PathBuf::from(m);
            match base_dir {
                Some(base) if path.is_relative() => base.join(path),
                _ => path,
            }
        });

        Ok(Self {
            name,
            version,
            maintainer: raw.maintainer,
            build_method: raw.make,
            build_options: raw.makeopts.map(RawOptions::into_args).unwrap_or_default(),
            depends: raw.depends.into_iter().map(PackageName::new).collect(),
            source: raw.source,
            fetch,
            makefile,
        })
    }
}

fn infer_fetch(method: BuildMethod, source: Option<&str>) -> Option<FetchKind> {
    match source {
        Some("pypi") => Some(FetchKind::Pip),
        Some(_) => Some(FetchKind::Git),
        None if method == BuildMethod::Pip => Some(FetchKind::Pip),
        None => None,
    }
}

/// Metadata describing how to obtain and build each package version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalogue {
    packages: BTreeMap<PackageName, BTreeMap<Version, PackageSpec>>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: PackageSpec) {
        self.packages
            .entry(spec.name.clone())
            .or_default()
            .insert(spec.version.clone(), spec);
    }

    pub fn versions(&self, name: &str) -> Option<&BTreeMap<Version, PackageSpec>> {
        self.packages.get(&PackageName::new(name))
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&PackageSpec> {
        self.versions(name)?.get(&Version::new(version))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Parse a catalogue. Relative `makefile` paths are resolved against `base_dir`.
pub fn parse_catalogue_str(input: &str, base_dir: Option<&Path>) -> Result<Catalogue, ManifestError> {
    let mapping = parse_mapping(input, "catalogue")?;
    let mut catalogue = Catalogue::new();

    for (key, versions) in &mapping {
        let name = scalar_to_string(key).ok_or_else(|| ManifestError::InvalidKey {
            what: "catalogue".to_owned(),
            key: format!("{key:?}"),
        })?;
        let Value::Mapping(versions) = versions else {
            return Err(ManifestError::InvalidVersion {
                what: "catalogue".to_owned(),
                package: name,
                found: format!("{versions:?}"),
            });
        };
        for (vkey, entry) in versions {
            let version = scalar_to_string(vkey).ok_or_else(|| ManifestError::InvalidKey {
                what: format!("catalogue package '{name}'"),
                key: format!("{vkey:?}"),
            })?;
            let raw: RawEntry = serde_yaml::from_value(entry.clone()).map_err(|source| {
                ManifestError::InvalidEntry {
                    package: name.clone(),
                    version: version.clone(),
                    source,
                }
            })?;
            let spec = PackageSpec::from_raw(
                PackageName::new(name.clone()),
                Version::new(version),
                raw,
                base_dir,
            )?;
            catalogue.insert(spec);
        }
    }

    Ok(catalogue)
}

pub fn parse_catalogue_file(path: impl AsRef<Path>) -> Result<Catalogue, ManifestError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        what: path.display().to_string(),
        source,
    })?;
    parse_catalogue_str(&content, path.parent())
}
