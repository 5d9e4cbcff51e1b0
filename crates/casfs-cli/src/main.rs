//! `casbak`: command-line front-end for CAS-FS backups (§6). Global flags
//! control the target backup directory and log verbosity; subcommands cover
//! the backup lifecycle (`init`, `import`, `export`, `ls`, `log`, `mount`).

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use casfs_config::logging::{init_logging, LogLevel};

#[derive(Parser)]
#[command(name = "casbak", version, disable_help_flag = true, about = "Content-addressable backup tool")]
struct Cli {
    /// Backup directory to operate on.
    #[arg(short = 'D', long = "casbak-dir", global = true, env = "CASBAK_DIR", default_value = "./casbak")]
    casbak_dir: PathBuf,

    /// Increase logging verbosity. May be repeated.
    #[arg(short = 'v', global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Suppress all but error-level logging.
    #[arg(short = 'q', long = "quiet", global = true, action = ArgAction::SetTrue)]
    quiet: bool,

    #[arg(short = '?', long = "help", action = ArgAction::Help, global = true)]
    help: Option<bool>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new backup directory.
    Init,
    /// Import a real directory tree into a new snapshot.
    Import {
        source: PathBuf,
        #[arg(short = 'c', long)]
        comment: Option<String>,
    },
    /// Extract a snapshot onto the real filesystem.
    Export {
        dest: PathBuf,
        #[arg(long)]
        at: Option<String>,
    },
    /// List the contents of a directory within a snapshot.
    Ls {
        #[arg(default_value = "/")]
        path: String,
        #[arg(long)]
        at: Option<String>,
    },
    /// Print the snapshot index.
    Log,
    /// Mount a snapshot read-only via FUSE.
    Mount {
        mountpoint: PathBuf,
        #[arg(long)]
        at: Option<String>,
    },
}

fn level_for(verbose: u8, quiet: bool) -> LogLevel {
    if quiet {
        return LogLevel::Error;
    }
    match verbose {
        0 => LogLevel::Warn,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(level_for(cli.verbose, cli.quiet));
    tracing::debug!(casbak_dir = %cli.casbak_dir.display(), "dispatching command");

    let result = match &cli.command {
        Commands::Init => commands::init::run(&cli.casbak_dir),
        Commands::Import { source, comment } => {
            commands::import::run(&cli.casbak_dir, source, comment.clone())
        }
        Commands::Export { dest, at } => commands::export::run(&cli.casbak_dir, dest, at.as_deref()),
        Commands::Ls { path, at } => commands::ls::run(&cli.casbak_dir, path, at.as_deref()),
        Commands::Log => commands::log::run(&cli.casbak_dir),
        Commands::Mount { mountpoint, at } => {
            commands::mount::run(&cli.casbak_dir, mountpoint, at.as_deref())
        }
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("casbak: {:#}", e);
            ExitCode::from(1)
        }
    }
}
