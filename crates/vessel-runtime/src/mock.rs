use crate::command::{CommandOutput, CommandSpec, ProcessRunner};
use crate::RuntimeError;
use std::io;
use std::sync::Mutex;

type Effect = Box<dyn Fn(&CommandSpec) -> io::Result<()> + Send + Sync>;

/// A [`ProcessRunner`] that records every command instead of running it.
///
/// Commands whose rendered command line contains one of the configured
/// failure patterns exit with status 1. Effects run for every recorded
/// command and can stand in for the files a real tool would produce.
#[derive(Default)]
pub struct MockRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failures: Vec<String>,
    effects: Vec<Effect>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_on(mut self, pattern: impl Into<String>) -> Self {
        self.failures.push(pattern.into());
        self
    }

    #[must_use]
    pub fn on_run(
        mut self,
        effect: impl Fn(&CommandSpec) -> io::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    pub fn invocations_of(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program() == program)
            .collect()
    }
}

impl ProcessRunner for MockRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RuntimeError> {
        self.calls
            .lock()
            .map_err(|e| RuntimeError::Io(io::Error::other(format!("mutex poisoned: {e}"))))?
            .push(spec.clone());

        let line = spec.command_line();
        if self.failures.iter().any(|p| line.contains(p.as_str())) {
            return Ok(CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: format!("mock failure: {line}\n"),
            });
        }
        for effect in &self.effects {
            effect(spec)?;
        }
        Ok(CommandOutput {
            code: Some(0),
            stdout: format!("mock: {line}\n"),
            stderr: String::new(),
        })
    }
}
