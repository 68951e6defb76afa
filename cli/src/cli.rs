//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use crate::app::{AppContext, OutputFlags};
use crate::commands;
use crate::output::OutputContext;

/// Pay for, provision and hand off GPU inference servers for agents
#[derive(Parser)]
#[command(
    name = "dejima",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Gate, pay for and provision a GPU server for an agent
    Reproduce(commands::reproduce::ReproduceArgs),

    /// Check whether an agent may reproduce
    Gate(commands::gate::GateArgs),

    /// Show what a settlement amount converts to
    Convert(commands::convert::ConvertArgs),

    /// Credit a wallet address in the local ledger
    Fund(commands::fund::FundArgs),

    /// Tear down a provisioned instance
    Destroy(commands::destroy::DestroyArgs),

    /// Summarise recorded cost and revenue signals
    Signals,

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            json,
            quiet,
            no_color,
            command,
            ..
        } = self;
        let flags = OutputFlags {
            no_color,
            quiet,
            json,
        };
        match command {
            Command::Version => {
                commands::version::run(json);
                Ok(())
            }
            Command::Convert(args) => {
                let ctx = OutputContext::new(no_color, quiet);
                commands::convert::run(&args, &ctx, json)
            }
            Command::Reproduce(args) => {
                let app = AppContext::new(&flags)?;
                commands::reproduce::run(&args, &app).await
            }
            Command::Gate(args) => {
                let app = AppContext::new(&flags)?;
                commands::gate::run(&args, &app).await
            }
            Command::Fund(args) => {
                let app = AppContext::new(&flags)?;
                commands::fund::run(&args, &app).await
            }
            Command::Destroy(args) => {
                let app = AppContext::new(&flags)?;
                commands::destroy::run(&args, &app).await
            }
            Command::Signals => {
                let app = AppContext::new(&flags)?;
                commands::signals::run(&app).await
            }
        }
    }
}
