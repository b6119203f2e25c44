use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use withpkgs_core::PackageManagerKind;

/// A package-manager invocation, kept as program plus arguments so it can be
/// rendered as one shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl PackageCommand {
    /// The command that adds `descriptors` to the manifest.
    pub fn install(kind: PackageManagerKind, descriptors: &[String]) -> Self {
        let verb = match kind {
            PackageManagerKind::Npm => "install",
            PackageManagerKind::Yarn | PackageManagerKind::Pnpm => "add",
        };
        let mut args = Vec::with_capacity(descriptors.len() + 1);
        args.push(verb.to_string());
        args.extend(descriptors.iter().cloned());
        Self {
            program: kind.as_str(),
            args,
        }
    }

    /// The bare reinstall used after the manifest is put back.
    pub fn reinstall(kind: PackageManagerKind) -> Self {
        Self {
            program: kind.as_str(),
            args: vec!["install".to_string()],
        }
    }

    /// Descriptors are joined verbatim; callers must sanitize shell syntax.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Executes package-manager commands for a guarded scope.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &PackageCommand, working_dir: Option<&Path>) -> Result<()>;
}

/// Runs commands through the platform shell and captures their output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn build(&self, line: &str) -> Command {
        if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(line);
            command
        } else {
            let mut command = Command::new("sh");
            command.arg("-c").arg(line);
            command
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &PackageCommand, working_dir: Option<&Path>) -> Result<()> {
        let line = command.command_line();
        let mut shell_command = self.build(&line);
        if let Some(dir) = working_dir {
            shell_command.current_dir(dir);
        }
        run_command(&mut shell_command, &format!("'{line}' failed"))
    }
}

pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}
