use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode, ExitStatus};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use withpkgs_core::{PackageManagerInfo, PackageManagerKind};
use withpkgs_installer::{GuardFailure, InterruptToken, PackageScope};

use crate::completion::write_completions_script;
use crate::config::WithPkgsConfig;
use crate::render::{current_output_style, render_status_line, OutputStyle};
use crate::signals::{forward_ctrl_c, INTERRUPTED_EXIT_CODE};
use crate::{Cli, Commands};

/// Command-line choices that take precedence over the config file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ManagerOverrides {
    pub manager: Option<PackageManagerKind>,
    pub lockfile: Option<PathBuf>,
    pub no_lockfile: bool,
}

pub(crate) fn run_cli(cli: Cli) -> Result<ExitCode> {
    let style = current_output_style(cli.plain);

    match cli.command {
        Commands::Run {
            packages,
            manager,
            lockfile,
            no_lockfile,
            command,
        } => {
            let config = WithPkgsConfig::load(&cli.project, cli.config.as_deref())?;
            let overrides = ManagerOverrides {
                manager,
                lockfile,
                no_lockfile,
            };
            let info = resolve_manager(&cli.project, &config, &overrides)?;

            let token = InterruptToken::new();
            forward_ctrl_c(token.clone())?;
            let scope = PackageScope::new(info)
                .with_interrupt(token.clone())
                .with_scratch(config.scratch_settings());

            run_guarded_command(&scope, &packages, &command, style)
        }
        Commands::Detect { manager } => {
            let config = WithPkgsConfig::load(&cli.project, cli.config.as_deref())?;
            let overrides = ManagerOverrides {
                manager,
                ..ManagerOverrides::default()
            };
            let info = resolve_manager(&cli.project, &config, &overrides)?;
            for line in format_detect_lines(&info) {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout();
            write_completions_script(shell, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Picks the project's manager from flags, then config, then detection, and
/// applies any lockfile override.
pub(crate) fn resolve_manager(
    project_dir: &Path,
    config: &WithPkgsConfig,
    overrides: &ManagerOverrides,
) -> Result<PackageManagerInfo> {
    let mut info = match overrides.manager.or(config.manager) {
        Some(kind) => PackageManagerInfo::for_kind(project_dir, kind)?,
        None => PackageManagerInfo::detect(project_dir)?,
    };

    let lockfile = overrides.lockfile.as_ref().or(config.lockfile.as_ref());
    let no_lockfile = overrides.no_lockfile || (overrides.lockfile.is_none() && config.no_lockfile);
    if no_lockfile {
        info.lockfile_path = None;
    } else if let Some(lockfile) = lockfile {
        let path = project_dir.join(lockfile);
        if !path.is_file() {
            return Err(anyhow!("lockfile not found: {}", path.display()));
        }
        info.lockfile_path = Some(path);
    }

    Ok(info)
}

pub(crate) fn format_detect_lines(info: &PackageManagerInfo) -> Vec<String> {
    let lockfile = info
        .lockfile_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    vec![
        format!("manager: {}", info.kind),
        format!("manifest: {}", info.package_json_path.display()),
        format!("lockfile: {lockfile}"),
    ]
}

fn run_guarded_command(
    scope: &PackageScope,
    packages: &[String],
    command: &[String],
    style: OutputStyle,
) -> Result<ExitCode> {
    let manager = scope.manager().kind;
    eprintln!(
        "{}",
        render_status_line(
            style,
            "info",
            &format!("installing {} with {manager}", packages.join(" "))
        )
    );

    let working_dir = scope
        .manager()
        .project_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let result = scope.run(packages, || run_child(command, &working_dir));

    match result {
        Err(err) if matches!(GuardFailure::find(&err), Some(GuardFailure::Interrupted)) => {
            eprintln!(
                "{}",
                render_status_line(style, "warn", "interrupted; package files restored")
            );
            Ok(ExitCode::from(INTERRUPTED_EXIT_CODE))
        }
        result => {
            let status = result?;
            eprintln!(
                "{}",
                render_status_line(style, "ok", "package files restored")
            );
            Ok(exit_code_for_status(status))
        }
    }
}

fn run_child(command: &[String], working_dir: &Path) -> Result<ExitStatus> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("no command given to run"))?;
    info!(program = %program, "running command with requested packages");
    let status = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .status()
        .with_context(|| format!("failed to start '{program}'"))?;
    if !status.success() {
        warn!(status = %status, "command finished unsuccessfully");
    }
    Ok(status)
}

pub(crate) fn exit_code_for_status(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::from(INTERRUPTED_EXIT_CODE),
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> ExitCode {
    match GuardFailure::find(err) {
        Some(GuardFailure::Interrupted) => ExitCode::from(INTERRUPTED_EXIT_CODE),
        _ => ExitCode::FAILURE,
    }
}
