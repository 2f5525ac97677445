use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::commands::{
    self, CommandReport, ask::AskOptions, change::ChangeOptions, codebase::CodebaseAction,
    init::InitOptions, show::ShowKind,
};

#[derive(Debug, Parser)]
#[command(
    name = "chatledger",
    version,
    about = "Resumable assistant conversations in plain text transcripts"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShowArg {
    Question,
    Answer,
    Original,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodebaseArg {
    Upload,
    Delete,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer the pending question at the end of the transcript.
    Ask {
        #[arg(long)]
        chat: Option<String>,
        /// Attach web search results for the question.
        #[arg(long)]
        search: bool,
        /// Extra file ids to attach, comma separated.
        #[arg(long = "use", value_delimiter = ',')]
        attachments: Vec<String>,
        /// Only report whether a question is pending.
        #[arg(long)]
        check: bool,
    },
    /// Show a recorded question or answer; 0 is the most recent.
    Show {
        #[arg(value_enum)]
        kind: ShowArg,
        #[arg(default_value_t = 0)]
        offset: usize,
    },
    /// Print the last answer in the transcript.
    Last {
        #[arg(long)]
        chat: Option<String>,
        /// Remove surrounding code fences.
        #[arg(long)]
        strip: bool,
    },
    /// List live remote resources recorded in the ledger.
    Objects,
    /// Delete live resources whose id or file path contains the pattern.
    Delete { pattern: String },
    /// Set the project name (resets the ledger) and/or default transcript.
    Init {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        chat: Option<String>,
    },
    /// Upload or remove the git-tracked codebase snapshot.
    Codebase {
        #[arg(value_enum)]
        action: CodebaseArg,
    },
    /// Ask for a multi-file change and optionally write the files.
    Change {
        #[arg(long)]
        chat: Option<String>,
        #[arg(long)]
        write: bool,
        /// Write the most recent batch without asking again.
        #[arg(long, conflicts_with = "write")]
        apply_last: bool,
    },
    /// Delete all live vector stores and assistants, then reset the ledger.
    Cleanup,
    /// Run commands/<name>.sh with the transcript path and ids.
    Run {
        name: String,
        #[arg(long)]
        chat: Option<String>,
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
    },
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for detail in &report.details {
        println!("{detail}");
    }
    for issue in &report.issues {
        eprintln!("issue: {issue}");
    }
    Ok(())
}

fn dispatch(command: Command) -> Result<CommandReport> {
    match command {
        Command::Ask {
            chat,
            search,
            attachments,
            check,
        } => commands::ask::run(&AskOptions {
            chat,
            search,
            attachments,
            check,
        }),
        Command::Show { kind, offset } => commands::show::run(
            match kind {
                ShowArg::Question => ShowKind::Question,
                ShowArg::Answer => ShowKind::Answer,
                ShowArg::Original => ShowKind::Original,
            },
            offset,
        ),
        Command::Last { chat, strip } => commands::last::run(chat.as_deref(), strip),
        Command::Objects => commands::objects::run(),
        Command::Delete { pattern } => commands::delete::run(&pattern),
        Command::Init { name, chat } => commands::init::run(&InitOptions { name, chat }),
        Command::Codebase { action } => commands::codebase::run(match action {
            CodebaseArg::Upload => CodebaseAction::Upload,
            CodebaseArg::Delete => CodebaseAction::Delete,
        }),
        Command::Change {
            chat,
            write,
            apply_last,
        } => commands::change::run(&ChangeOptions {
            chat,
            write,
            apply_last,
        }),
        Command::Cleanup => commands::cleanup::run(),
        Command::Run { name, chat, ids } => {
            commands::run_script::run(&name, chat.as_deref(), &ids)
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = dispatch(cli.command)?;
    render(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}
