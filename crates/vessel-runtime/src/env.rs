use std::collections::BTreeMap;
use std::path::Path;

/// Environment variables pointing subprocesses at an installed release tree.
///
/// Built once after cutover and handed to every command that needs it; the
/// coordinating process's own environment is never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnv {
    vars: BTreeMap<String, String>,
}

fn join_paths<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

/// `site-packages` directories of `root` for python `pyver` (`major.minor`).
pub fn python_paths(root: &Path, pyver: &str) -> String {
    let lib = root.join("lib").join(format!("python{pyver}")).join("site-packages");
    let lib64 = root
        .join("lib64")
        .join(format!("python{pyver}"))
        .join("site-packages");
    format!("{}:{}", lib.display(), lib64.display())
}

impl RuntimeEnv {
    /// `LD_LIBRARY_PATH` and `PATH` put `root` in front of the inherited
    /// values; `PYTHONPATH` points only at `root`'s site-packages.
    pub fn for_installed_root(
        root: &Path,
        pyver: &str,
        inherited: &BTreeMap<String, String>,
    ) -> Self {
        let inherited_var = |k: &str| inherited.get(k).map_or("", String::as_str);
        let lib = root.join("lib");
        let lib64 = root.join("lib64");
        let bin = root.join("bin");

        let mut vars = BTreeMap::new();
        vars.insert(
            "LD_LIBRARY_PATH".to_owned(),
            join_paths([
                &*lib.to_string_lossy(),
                &*lib64.to_string_lossy(),
                inherited_var("LD_LIBRARY_PATH"),
            ]),
        );
        vars.insert("PYTHONPATH".to_owned(), python_paths(root, pyver));
        vars.insert(
            "PATH".to_owned(),
            join_paths([&*bin.to_string_lossy(), inherited_var("PATH")]),
        );
        Self { vars }
    }

    /// Snapshot of the variables [`for_installed_root`](Self::for_installed_root)
    /// extends, read from this process.
    pub fn inherited() -> BTreeMap<String, String> {
        ["LD_LIBRARY_PATH", "PATH"]
            .into_iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| (k.to_owned(), v)))
            .collect()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[inline]
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}
