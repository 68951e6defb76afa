//! Dejima CLI - pay for, provision and hand off GPU inference servers for agents

use clap::Parser;
use dejima_cli::cli::Cli;
use dejima_cli::commands::RunFailed;
use dejima_cli::output::json::format_error;
use tracing_subscriber::EnvFilter;

/// `-v` wins over `DEJIMA_LOG`; with neither, only warnings are logged.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("DEJIMA_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;

    if let Err(e) = cli.run().await {
        if e.downcast_ref::<RunFailed>().is_some() {
            std::process::exit(2);
        }
        if json {
            let body = format_error(&format!("{e:#}"), "error")
                .unwrap_or_else(|_| format!("{{\"error\":true,\"message\":\"{e}\"}}"));
            println!("{body}");
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}
