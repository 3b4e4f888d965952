use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use modlink::{
    commands,
    paths::Paths,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "modlink")]
#[command(about = "Symlink-based mod enabler for simulator installs")]
#[command(version)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enable a mod package for a profile
    Enable {
        /// Path to the extracted mod package
        mod_dir: PathBuf,

        /// Profile to enable for (defaults to the default profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Disable a mod package for a profile
    Disable {
        /// Path to the extracted mod package
        mod_dir: PathBuf,

        /// Profile to disable for (defaults to the default profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Show the enablement state of a mod package
    Status {
        /// Path to the extracted mod package
        mod_dir: PathBuf,

        /// Profile to inspect (defaults to the default profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// List all mod packages under a directory with their state
    List {
        /// Directory containing extracted mod packages
        mods_dir: PathBuf,

        /// Profile to report against (defaults to the default profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Check a mod package's structure without touching anything
    Validate {
        /// Path to the extracted mod package
        mod_dir: PathBuf,
    },

    /// Manage installation profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Run diagnostics on profiles and installation roots
    Doctor {
        /// Profile whose installation root should be scanned
        #[arg(long)]
        profile: Option<String>,

        /// Also check mod packages under this directory for stale markers
        #[arg(long, value_name = "DIR")]
        mods_dir: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Register an installation root under a name
    Add {
        /// Profile name (used in marker files, e.g. ENABLED-<name>)
        name: String,

        /// Installation root mods get merged into
        root: PathBuf,
    },

    /// Remove a profile from the registry
    Remove {
        /// Profile name
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// List registered profiles
    List,

    /// Make a profile the default
    Use {
        /// Profile name
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = Paths::new()?;
    let ui = Ui::new(cli.color, cli.no_color);

    match cli.command {
        Commands::Enable { mod_dir, profile } => {
            commands::enable(&paths, &mod_dir, profile.as_deref(), &ui)
        }
        Commands::Disable { mod_dir, profile } => {
            commands::disable(&paths, &mod_dir, profile.as_deref(), &ui)
        }
        Commands::Status { mod_dir, profile } => {
            commands::status(&paths, &mod_dir, profile.as_deref(), &ui)
        }
        Commands::List { mods_dir, profile } => {
            commands::list(&paths, &mods_dir, profile.as_deref(), &ui)
        }
        Commands::Validate { mod_dir } => commands::validate(&mod_dir, &ui),
        Commands::Profile { command } => match command {
            ProfileCommands::Add { name, root } => commands::profile_add(&paths, &name, &root, &ui),
            ProfileCommands::Remove { name, force } => {
                commands::profile_remove(&paths, &name, force, &ui)
            }
            ProfileCommands::List => commands::profile_list(&paths, &ui),
            ProfileCommands::Use { name } => commands::profile_use(&paths, &name, &ui),
        },
        Commands::Doctor { profile, mods_dir } => {
            commands::doctor(&paths, profile.as_deref(), mods_dir.as_deref(), &ui)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "modlink",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}
