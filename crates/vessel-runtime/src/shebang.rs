use crate::RuntimeError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rewrite `#!...python...` interpreter lines of the scripts directly in
/// `bin_dir` to `#!<interpreter>`. Returns the rewritten files.
///
/// Binaries and scripts for other interpreters are left alone. File modes
/// are preserved and each rewrite is an atomic replace.
pub fn fixup_python_shebangs(
    bin_dir: &Path,
    interpreter: &Path,
) -> Result<Vec<PathBuf>, RuntimeError> {
    let mut rewritten = Vec::new();
    if !bin_dir.is_dir() {
        return Ok(rewritten);
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(bin_dir)?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
        .map(|e| e.path())
        .collect();
    entries.sort();

    let new_line = format!("#!{}", interpreter.display());
    for path in entries {
        let content = fs::read(&path)?;
        let Some(rest) = python_shebang_rest(&content) else {
            continue;
        };
        if content.starts_with(new_line.as_bytes()) && rest.first() == Some(&b'\n') {
            continue;
        }

        let mut updated = Vec::with_capacity(content.len());
        updated.extend_from_slice(new_line.as_bytes());
        updated.extend_from_slice(rest);

        let permissions = fs::metadata(&path)?.permissions();
        let mut tmp = tempfile::NamedTempFile::new_in(bin_dir)?;
        tmp.write_all(&updated)?;
        tmp.as_file().set_permissions(permissions)?;
        tmp.persist(&path).map_err(|e| RuntimeError::Io(e.error))?;
        debug!("rewrote interpreter line of {}", path.display());
        rewritten.push(path);
    }
    Ok(rewritten)
}

/// For a python script, the bytes after its interpreter line (starting at
/// the newline).
fn python_shebang_rest(content: &[u8]) -> Option<&[u8]> {
    if !content.starts_with(b"#!") {
        return None;
    }
    let end = content
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(content.len());
    let line = &content[..end];
    line.windows(6)
        .any(|w| w == b"python")
        .then_some(&content[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn rewrites_python_scripts_only() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        fs::write(bin.join("tool"), "#!/build/fake/root/bin/python3.8\nimport sys\n").unwrap();
        fs::set_permissions(bin.join("tool"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(bin.join("env-tool"), "#!/usr/bin/env python\nprint(1)\n").unwrap();
        fs::write(bin.join("shell"), "#!/bin/sh\necho python\n").unwrap();
        fs::write(bin.join("elf"), b"\x7fELF\x02\x01python").unwrap();

        let interp = Path::new("/p/rel/root/bin/python");
        let changed = fixup_python_shebangs(&bin, interp).unwrap();
        assert_eq!(changed, vec![bin.join("env-tool"), bin.join("tool")]);

        assert_eq!(
            fs::read_to_string(bin.join("tool")).unwrap(),
            "#!/p/rel/root/bin/python\nimport sys\n"
        );
        assert_eq!(
            fs::read_to_string(bin.join("env-tool")).unwrap(),
            "#!/p/rel/root/bin/python\nprint(1)\n"
        );
        assert_eq!(
            fs::read_to_string(bin.join("shell")).unwrap(),
            "#!/bin/sh\necho python\n"
        );
        let mode = fs::metadata(bin.join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn already_fixed_script_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t"), "#!/r/bin/python\nx\n").unwrap();
        let changed = fixup_python_shebangs(dir.path(), Path::new("/r/bin/python")).unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn missing_bin_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let changed =
            fixup_python_shebangs(&dir.path().join("bin"), Path::new("/r/bin/python")).unwrap();
        assert!(changed.is_empty());
    }
}
