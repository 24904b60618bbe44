//! Subprocess execution and per-method build backends for Vessel.
//!
//! This crate implements the execution layer: typed subprocess descriptions
//! (`CommandSpec`, `CommandOutput`) run through a pluggable `ProcessRunner`,
//! the immutable `RuntimeEnv` pointing at an installed tree, one `BuildBackend`
//! per build method, artifact fetchers, privilege-escalated filesystem
//! operations (`SudoFs`), shim generation, python interpreter-line rewriting,
//! and prerequisite checking.

pub mod command;
pub mod env;
pub mod fetch;
pub mod methods;
pub mod mock;
pub mod prereq;
pub mod shebang;
pub mod shim;
pub mod sudo;
pub mod tools;

pub use command::{run_checked, shell_quote, CommandOutput, CommandSpec, ProcessRunner, SystemRunner};
pub use env::{python_paths, RuntimeEnv};
pub use methods::{select_method, BuildBackend, BuildContext, FetchContext, ReinstallContext};
pub use mock::MockRunner;
pub use prereq::{check_release_prereqs, format_missing, MissingPrereq};
pub use shebang::fixup_python_shebangs;
pub use shim::{ScriptShims, ShimGenerator, SHIMMED_DIR};
pub use sudo::SudoFs;
pub use tools::Tools;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {}{}", describe_exit(.code), stderr_tail(.stderr))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{package} {version}: {reason}")]
    MissingInput {
        package: String,
        version: String,
        reason: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_owned(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(5);
    format!("\n{}", lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_shows_code_and_stderr_tail() {
        let e = RuntimeError::CommandFailed {
            command: "cmake /src".to_owned(),
            code: Some(2),
            stderr: (1..=8).map(|i| format!("line {i}\n")).collect(),
        };
        let msg = e.to_string();
        assert!(msg.contains("`cmake /src` exited with status 2"));
        assert!(msg.contains("line 8"));
        assert!(!msg.contains("line 3"));
    }

    #[test]
    fn command_failed_by_signal() {
        let e = RuntimeError::CommandFailed {
            command: "make".to_owned(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(e.to_string(), "`make` exited with a signal");
    }
}
