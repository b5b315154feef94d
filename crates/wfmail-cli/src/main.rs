mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wfmail",
    about = "Maildir-backed workflow messaging between roles: send, search, thread, and decide",
    version,
    propagate_version = true
)]
struct Cli {
    /// Maildir root holding one mailbox per role (default: ~/Maildir/workflow)
    #[arg(long, global = true, env = "WORKFLOW_MAILDIR")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the maildir root, config, and a mailbox per configured role
    Init {
        /// Extra role to register (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// Deliver a prepared message file ("-" for stdin)
    Send {
        file: PathBuf,
        /// Recipient roles or mailbox paths (default: the message's To header)
        to: Vec<String>,
    },

    /// Compose a message from a template and deliver it
    Notify(cmd::notify::NotifyArgs),

    /// List a mailbox in delivery order
    List {
        /// Role, panel, or mailbox path
        mailbox: String,
        /// new, cur, or both
        #[arg(long, default_value = "both")]
        area: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search messages by header metadata
    Search(cmd::search::SearchArgs),

    /// Print one message
    Read {
        mailbox: String,
        key: String,
        /// Print the stored wire form unchanged
        #[arg(long)]
        raw: bool,
        /// Mark the message seen after printing it
        #[arg(long)]
        mark_seen: bool,
    },

    /// Mark messages seen (moves them from new/ to cur/)
    Seen { mailbox: String, keys: Vec<String> },

    /// Show the conversation containing a message
    Thread {
        message_id: String,
        /// Mailboxes to search (default: every mailbox under the root)
        mailboxes: Vec<String>,
    },

    /// Messages a role still has to act on, oldest first
    Pending {
        role: String,
        /// Include messages already marked seen
        #[arg(long)]
        all: bool,
    },

    /// Tally a panel's decision messages
    Consensus {
        panel: String,
        /// Override the panel's decision model: consensus, majority, primary-decides
        #[arg(long)]
        model: Option<String>,
        /// Only count votes newer than this (7d, 24h, 2025-11-01)
        #[arg(long, default_value = "7d")]
        since: String,
    },

    /// Show or validate wfmail.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { roles } => cmd::init::run(&root, &roles, cli.json),
        Commands::Send { file, to } => cmd::send::run(&root, &file, &to, cli.json),
        Commands::Notify(args) => cmd::notify::run(&root, args, cli.json),
        Commands::List {
            mailbox,
            area,
            limit,
        } => cmd::list::run(&root, &mailbox, &area, limit, cli.json),
        Commands::Search(args) => cmd::search::run(&root, args, cli.json),
        Commands::Read {
            mailbox,
            key,
            raw,
            mark_seen,
        } => cmd::read::run(&root, &mailbox, &key, raw, mark_seen, cli.json),
        Commands::Seen { mailbox, keys } => cmd::seen::run(&root, &mailbox, &keys, cli.json),
        Commands::Thread {
            message_id,
            mailboxes,
        } => cmd::thread::run(&root, &message_id, &mailboxes, cli.json),
        Commands::Pending { role, all } => cmd::pending::run(&root, &role, all, cli.json),
        Commands::Consensus {
            panel,
            model,
            since,
        } => cmd::consensus::run(&root, &panel, model.as_deref(), &since, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
