use std::sync::Mutex;

use async_trait::async_trait;
use bw_acquire::AcquisitionError;

use crate::{CommandOutput, RemoteExecutor};

/// Executor answering from recorded outputs, matched by command substring in
/// registration order. Unmatched commands exit 127.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, Result<CommandOutput, AcquisitionError>)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.push((needle.into(), Ok(output)));
        self
    }

    pub fn on_stdout(self, needle: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.on(needle, CommandOutput::ok(stdout))
    }

    pub fn on_error(mut self, needle: impl Into<String>, error: AcquisitionError) -> Self {
        self.rules.push((needle.into(), Err(error)));
        self
    }

    /// Every command run so far, with any sudo prefix.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    fn destination(&self) -> String {
        "scripted://".to_string()
    }

    async fn run(&self, command: &str, sudo: bool) -> Result<CommandOutput, AcquisitionError> {
        let line = if sudo { format!("sudo {command}") } else { command.to_string() };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line);
        }
        self.rules
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| Ok(CommandOutput::failed(127, format!("command not found: {command}"))))
    }
}
