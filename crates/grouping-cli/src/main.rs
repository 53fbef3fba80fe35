mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, member::MemberSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "grouping",
    about = "Live-event group allocation: register members, publish groups, keep them fresh",
    version,
    propagate_version = true
)]
struct Cli {
    /// Event root (default: auto-detect from .grouping/)
    #[arg(long, global = true, env = "GROUPING_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Seed the random source (reproducible allocations)
    #[arg(long, global = true, env = "GROUPING_SEED", hide = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an event in the current directory
    Init {
        /// Event name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Register a participant
    Register {
        name: String,
        /// Two-character birth tag, e.g. the year "95"
        #[arg(long)]
        birth: Option<String>,
    },

    /// List or delete members
    Member {
        #[command(subcommand)]
        subcommand: MemberSubcommand,
    },

    /// Admin view: refresh countdown, groups and unassigned members
    Status,

    /// Participant view: your group and everyone else's
    View {
        #[arg(long)]
        name: String,
        #[arg(long)]
        birth: Option<String>,
    },

    /// Publish groups once (regenerating first with --regenerate)
    Publish {
        #[arg(long)]
        regenerate: bool,
    },

    /// Remove every member and the refresh deadline
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Show and change allocation settings
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run the admin session: refresh timer plus commands read from stdin
    Admin,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Admin => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let seed = cli.seed;

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::Register { name, birth } => {
            cmd::register::run(&root, &name, birth.as_deref(), cli.json)
        }
        Commands::Member { subcommand } => cmd::member::run(&root, subcommand, seed, cli.json),
        Commands::Status => cmd::status::run(&root, seed, cli.json),
        Commands::View { name, birth } => cmd::view::run(&root, &name, birth, cli.json),
        Commands::Publish { regenerate } => cmd::publish::run(&root, regenerate, seed, cli.json),
        Commands::Reset { yes } => cmd::reset::run(&root, yes, seed, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Admin => cmd::admin::run(&root, seed),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
