//! `loadlens` - page-load phase measurement and what-if simulation

use clap::Parser;

use loadlens::cli::args::{Cli, LogFormatArg};
use loadlens::cli::commands;
use loadlens::error::ExitCode;
use loadlens::observability::{LogFormat, init_logging};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let format = match cli.log_format {
        LogFormatArg::Human => LogFormat::Human,
        LogFormatArg::Json => LogFormat::Json,
    };
    init_logging(format, cli.verbose, cli.quiet, cli.color);

    // A signal drops the command future; returning from main then shuts the
    // runtime down, so every driver child is dropped and killed.
    let code = tokio::select! {
        result = commands::dispatch(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                e.exit_code()
            }
        },
        code = shutdown_signal() => {
            eprintln!("\nShutting down, stopping browser drivers...");
            code
        }
    };

    std::process::ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Waits for Ctrl+C or SIGTERM and returns the matching exit code.
async fn shutdown_signal() -> i32 {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => ExitCode::INTERRUPTED,
        () = sigterm => ExitCode::TERMINATED,
    }
}
