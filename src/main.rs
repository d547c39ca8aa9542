use std::{io, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

mod clients_command;
mod config;
mod console;
mod copy_command;
mod datetime;
mod error;
mod filter;
mod fix_command;
mod logger;
mod mapping;
mod pipeline;
mod prompt;
mod split_command;
mod time_entry;
mod toggl;

use clients_command::ClientsCommand;
use config::Settings;
use console::ConsoleTable;
use copy_command::{CopyArgs, CopyCommand};
use error::ToolError;
use fix_command::{FixArgs, FixCommand};
use pipeline::RunOutcome;
use prompt::TerminalPrompt;
use split_command::{SplitArgs, SplitCommand};
use toggl::TogglClient;

/// Togglのtime entryを修正、コピー、分割するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- clients
/// $ cargo run -- fix -w 123456 -d 20210101
/// $ cargo run -- copy -s 123456 -w 654321 -d 20210101
/// $ cargo run -- split -w 123456 -d 20210101
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        short = 'c',
        long = "config",
        global = true,
        help = "Path to the YAML config file (default: ./config.yml)"
    )]
    config: Option<PathBuf>,

    #[clap(short = 'v', long = "verbose", global = true, help = "Show debug logs")]
    verbose: bool,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// List clients and the workspaces they belong to
    Clients,
    /// Move time entries that do not start at midnight to midnight
    Fix(FixArgs),
    /// Copy time entries to another workspace using project mappings
    Copy(CopyArgs),
    /// Split one time entry into several by proportions
    Split(SplitArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::setup_logger(args.verbose)?;

    run(args).await.map_err(|err| {
        let kind = err.downcast_ref::<ToolError>().map(ToolError::kind);
        match kind {
            Some(kind) => err.context(kind.to_string()),
            None => err,
        }
    })
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let toggl = TogglClient::new(&settings.toggl.api_key);
    let mut prompt = TerminalPrompt;
    let mut stdout = io::stdout();
    let mut console = ConsoleTable::new(&mut stdout);

    let outcome = match args.subcommand {
        SubCommands::Clients => {
            ClientsCommand::new(&toggl, &mut console).run().await?;
            RunOutcome::ClientsListed
        }
        SubCommands::Fix(fix) => {
            FixCommand::new(&toggl, &mut prompt, &mut console)
                .run(fix)
                .await?
        }
        SubCommands::Copy(copy) => {
            CopyCommand::new(&toggl, &mut prompt, &mut console)
                .run(copy)
                .await?
        }
        SubCommands::Split(split) => {
            SplitCommand::new(&toggl, &mut prompt, &mut console)
                .run(split)
                .await?
        }
    };

    match outcome {
        RunOutcome::Submitted(report) if report.failed > 0 => Err(ToolError::Upstream(format!(
            "{} of {} submissions failed",
            report.failed,
            report.failed + report.succeeded.len()
        ))
        .into()),
        RunOutcome::Submitted(report) => {
            info!("{} time entries submitted.", report.succeeded.len());
            Ok(())
        }
        other => {
            info!("Finished without submission: {:?}", other);
            Ok(())
        }
    }
}
