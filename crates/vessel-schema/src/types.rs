//! Newtype wrappers for package and release identifiers.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Name of a package as it appears in manifests and catalogues.
    PackageName
);

string_newtype!(
    /// A pinned version string, compared verbatim.
    Version
);

impl Version {
    /// The version with any `+local` suffix removed, as package indexes expect it.
    pub fn pip_version(&self) -> &str {
        self.0.split_once('+').map_or(self.0.as_str(), |(base, _)| base)
    }

    /// `major.minor` of a dotted version, or the whole string when it has no dot.
    pub fn major_minor(&self) -> String {
        let base = self.pip_version();
        let mut parts = base.split('.');
        match (parts.next(), parts.next()) {
            (Some(major), Some(minor)) => format!("{major}.{minor}"),
            _ => base.to_owned(),
        }
    }
}

/// `<name>-<version>`, the key used for cache entries and build directories.
pub fn package_key(name: &PackageName, version: &Version) -> String {
    format!("{name}-{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_display_and_as_ref() {
        let name = PackageName::new("numpy");
        assert_eq!(name.to_string(), "numpy");
        assert_eq!(name.as_str(), "numpy");
        assert_eq!(AsRef::<str>::as_ref(&name), "numpy");
    }

    #[test]
    fn version_serializes_as_plain_string() {
        let v = Version::new("1.2.3");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"1.2.3\"");
    }

    #[test]
    fn pip_version_strips_local_suffix() {
        assert_eq!(Version::new("1.0+py3").pip_version(), "1.0");
        assert_eq!(Version::new("2.4.1").pip_version(), "2.4.1");
    }

    #[test]
    fn major_minor_of_interpreter_versions() {
        assert_eq!(Version::new("3.8.6").major_minor(), "3.8");
        assert_eq!(Version::new("3.11").major_minor(), "3.11");
        assert_eq!(Version::new("3").major_minor(), "3");
        assert_eq!(Version::new("2.7.14+builtin").major_minor(), "2.7");
    }

    #[test]
    fn package_key_joins_name_and_version() {
        let key = package_key(&PackageName::new("foo"), &Version::new("1.0"));
        assert_eq!(key, "foo-1.0");
    }
}
