use anyhow::Result;
use clap::Parser;
use modstash::archive::ZipExtractor;
use modstash::commands::{self, Config};
use std::path::PathBuf;

/// modstash - game mod package manager
///
/// Installs extracted mod packages into a game directory, tracks which files
/// belong to which package, and counts how many installed packages require
/// each dependency so that removing a mod never breaks another one.
///
/// Examples:
///   modstash -g ~/Games/LethalCompany install ./downloads/BepInEx-BepInExPack-5.4.2100
///   modstash remove bizzlemip-BiggerLobby-2.7.0
#[derive(Parser, Debug)]
#[command(author, version = env!("MODSTASH_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Game directory (also via MODSTASH_GAME_DIR)
    #[arg(
        long = "game-dir",
        short = 'g',
        env = "MODSTASH_GAME_DIR",
        value_name = "PATH",
        global = true
    )]
    pub game_dir: Option<PathBuf>,

    /// Log progress at info level
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install extracted package folders or .zip package archives
    Install(InstallArgs),

    /// Remove an installed package and dependencies nothing else needs
    Remove(RemoveArgs),

    /// Remove every installed package
    RemoveAll(RemoveAllArgs),

    /// List installed packages
    List,

    /// Show details about an installed package
    Show(ShowArgs),

    /// Print dependency reference counts
    Refs,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package folders named <developer>-<name>-<version>, or archives named <key>.zip
    #[arg(value_name = "PATH", required = true)]
    pub sources: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Dependency key of the package, e.g. "bizzlemip-BiggerLobby-2.7.0"
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct RemoveAllArgs {
    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Dependency key of the package
    #[arg(value_name = "KEY")]
    pub key: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runtime = modstash::runtime::RealRuntime;
    let config = Config::new(&runtime, cli.game_dir)?;

    match cli.command {
        Commands::Install(args) => {
            commands::install(runtime, &ZipExtractor, &args.sources, config)?
        }
        Commands::Remove(args) => commands::remove(runtime, &args.key, args.yes, config)?,
        Commands::RemoveAll(args) => commands::remove_all(runtime, args.yes, config)?,
        Commands::List => commands::list(runtime, config)?,
        Commands::Show(args) => commands::show(runtime, &args.key, config)?,
        Commands::Refs => commands::refs(runtime, config)?,
    }
    Ok(())
}
