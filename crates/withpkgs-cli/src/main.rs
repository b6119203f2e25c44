use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;
use withpkgs_core::PackageManagerKind;

mod completion;
mod config;
mod dispatch;
mod render;
mod signals;

use dispatch::{exit_code_for_error, run_cli};
use render::{current_output_style, render_status_line};

#[derive(Parser, Debug)]
#[command(name = "withpkgs")]
#[command(
    about = "Run a command with extra npm packages installed, then put package.json back",
    long_about = None
)]
struct Cli {
    /// Project directory containing package.json.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,
    /// Config file; defaults to <project>/withpkgs.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Disable colored status output.
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install packages, run a command, then restore the project.
    Run {
        #[arg(short = 'p', long = "package", value_name = "DESCRIPTOR", required = true)]
        packages: Vec<String>,
        #[arg(long, value_parser = parse_manager_kind)]
        manager: Option<PackageManagerKind>,
        #[arg(long, conflicts_with = "no_lockfile")]
        lockfile: Option<PathBuf>,
        #[arg(long)]
        no_lockfile: bool,
        #[arg(
            value_name = "COMMAND",
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },
    /// Show which package manager and files would be guarded.
    Detect {
        #[arg(long, value_parser = parse_manager_kind)]
        manager: Option<PackageManagerKind>,
    },
    Completions {
        shell: Shell,
    },
}

fn parse_manager_kind(value: &str) -> Result<PackageManagerKind, String> {
    PackageManagerKind::parse(value)
        .ok_or_else(|| format!("unsupported package manager '{value}' (expected npm, yarn or pnpm)"))
}

fn init_tracing(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let style = current_output_style(cli.plain);

    match run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", render_status_line(style, "error", &format!("{err:#}")));
            exit_code_for_error(&err)
        }
    }
}
