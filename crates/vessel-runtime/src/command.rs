use crate::env::RuntimeEnv;
use crate::RuntimeError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// A subprocess to run: program, arguments, working directory and the
/// environment variables set on top of the inherited ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    sudo: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            sudo: false,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn runtime_env(mut self, env: &RuntimeEnv) -> Self {
        for (k, v) in env.vars() {
            self.env.insert(k.clone(), v.clone());
        }
        self
    }

    /// Run through `sudo`. The environment is passed explicitly with `env`,
    /// since sudo does not forward it.
    #[must_use]
    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    #[inline]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[inline]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    #[inline]
    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    #[inline]
    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    #[inline]
    pub fn is_sudo(&self) -> bool {
        self.sudo
    }

    /// The argv that is actually executed, after sudo wrapping.
    pub fn argv(&self) -> Vec<String> {
        if !self.sudo {
            let mut argv = Vec::with_capacity(self.args.len() + 1);
            argv.push(self.program.clone());
            argv.extend(self.args.iter().cloned());
            return argv;
        }
        let mut argv = vec!["sudo".to_owned()];
        if !self.env.is_empty() {
            argv.push("env".to_owned());
            argv.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// A copy-pasteable rendering, including the working directory and
    /// environment, for reproducing a failure by hand.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::new();
        if let Some(cwd) = &self.cwd {
            parts.push(format!("cd {} &&", shell_quote(&cwd.to_string_lossy())));
        }
        if !self.sudo {
            parts.extend(
                self.env
                    .iter()
                    .map(|(k, v)| format!("{k}={}", shell_quote(v))),
            );
        }
        parts.extend(self.argv().iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }

    pub fn to_command(&self) -> Command {
        let argv = self.argv();
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if !self.sudo {
            cmd.envs(&self.env);
        }
        cmd
    }
}

/// Quote `s` for a POSIX shell if it needs it.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/' | b'=' | b':' | b'+' | b',' | b'@' | b'%')
        });
    if safe {
        s.to_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// What a finished subprocess produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Executes [`CommandSpec`]s. Implementations must not interpret the spec
/// through a shell.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RuntimeError>;
}

/// Run `spec` and turn a non-zero exit into [`RuntimeError::CommandFailed`].
pub fn run_checked(
    runner: &dyn ProcessRunner,
    spec: &CommandSpec,
) -> Result<CommandOutput, RuntimeError> {
    debug!("run: {}", spec.command_line());
    let output = runner.run(spec)?;
    if output.success() {
        Ok(output)
    } else {
        Err(RuntimeError::CommandFailed {
            command: spec.command_line(),
            code: output.code,
            stderr: output.stderr,
        })
    }
}

/// Runs commands on the host, blocking until each finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RuntimeError> {
        let output = spec
            .to_command()
            .output()
            .map_err(|source| RuntimeError::Spawn {
                command: spec.command_line(),
                source,
            })?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.is_empty() {
            debug!(stderr = %stderr.trim_end(), "command stderr");
        }
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}
