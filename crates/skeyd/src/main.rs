mod cli;
mod commands;
mod error;
mod privilege;

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

// The reactor is single-threaded; watcher tasks share its thread.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let guard = match init_tracing(&cli.global) {
        Ok(guard) => guard,
        Err(err) => fail(err),
    };

    let result = run(cli).await;
    // Flush buffered file logs before exiting.
    drop(guard);

    if let Err(err) = result {
        fail(err);
    }
}

fn fail(err: CliError) -> ! {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    std::process::exit(code);
}

/// Stderr by default; with `--log-file`, a non-blocking file writer whose
/// guard must outlive the run.
fn init_tracing(global: &GlobalOpts) -> Result<Option<WorkerGuard>, CliError> {
    let level = match global.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(path) = global.log_file.as_deref() else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
        return Ok(None);
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(open_log_file(path)?);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();
    Ok(Some(guard))
}

fn open_log_file(path: &Path) -> Result<RollingFileAppender, CliError> {
    let invalid = |reason: String| CliError::LogFile {
        path: path.to_path_buf(),
        reason,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid("not a file name".into()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| invalid(e.to_string()))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    tracing::debug!(command = ?cli.command, "dispatching command");
    match cli.command {
        Command::Run => commands::run::handle(&cli.global).await,
        Command::Check => commands::check::handle(&cli.global),
        Command::ExampleConfig(args) => commands::example::handle(args.output.as_deref()),
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "skeyd", &mut std::io::stdout());
            Ok(())
        }
    }
}
