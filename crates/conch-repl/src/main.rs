//! conch CLI entry point.
//!
//! Usage:
//!   conch                      # Interactive REPL
//!   conch -c <source>          # Evaluate source and exit
//!   conch script.conch         # Run a script

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use conch_kernel::{ExitStatus, KernelConfig};
use conch_repl::format::exit_code;

fn main() -> ExitCode {
    // Silent unless RUST_LOG asks; stdout belongs to the shell's commands.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(status) => ExitCode::from(exit_code(status)),
        Err(e) => {
            eprintln!("conch: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitStatus> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None => conch_repl::run(),

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitStatus::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("conch {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitStatus::SUCCESS)
        }

        Some("-c") => {
            let source = args.get(2).context("-c requires a source argument")?;
            conch_repl::run_source(source, KernelConfig::script().with_name("command"))
        }

        Some(path) if !path.starts_with('-') => {
            let source = conch_repl::read_script(Path::new(path));
            conch_repl::run_source(&source, KernelConfig::script().with_name(path))
        }

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'conch --help' for usage.");
            Ok(ExitStatus::from_code(2))
        }
    }
}

fn print_help() {
    println!(
        r#"conch v{}

Usage:
  conch                        Interactive REPL
  conch -c <source>            Evaluate source and exit
  conch <script>               Run a script file

Options:
  -c <source>                  Evaluate source and exit
  -h, --help                   Show this help
  -V, --version                Show version

The exit status is the status of the last command run.
Set RUST_LOG (e.g. RUST_LOG=conch_kernel=debug) for diagnostics on stderr.
"#,
        env!("CARGO_PKG_VERSION")
    );
}
