//! # Content Sync CLI (`content-sync`)
//!
//! ## Usage
//!
//! ```bash
//! content-sync --config ./config/content.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `content-sync init` | Create the SQLite database and schema |
//! | `content-sync sources` | List configured content sources and whether they are usable |
//! | `content-sync create <draft.json>` | Create a text record, syncing it if externally managed |
//! | `content-sync sync <public-id>` | Refresh one record from its external location |
//! | `content-sync reconcile <source>` | Reconcile a GitLab source's namespace with its repository |
//! | `content-sync get <id \| namespace/slug>` | Print one record |
//! | `content-sync person add <name>` | Register a person that contributors can reference |
//! | `content-sync person show <public-id>` | Print a registered person |

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use content_sync::logging::{self, LogLevelArgs};
use content_sync::{config, get, migrate, service, sources};

/// Content Sync: transactional content storage kept in step with URL and
/// GitLab sources.
#[derive(Parser)]
#[command(name = "content-sync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/content.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (-q warn, -qq error).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// List configured content sources.
    Sources,

    /// Create a text record from a JSON draft file.
    Create {
        /// Path to the draft (namespace, slug, title, optional extern_path, ...).
        draft: PathBuf,

        /// Print the created record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Refresh one record from its external location.
    Sync {
        /// Public id of the record.
        public_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Bring a source's namespace in line with its repository.
    Reconcile {
        /// Source name as configured under `[sources.gitlab.<name>]`.
        source: String,

        /// Print the reconciliation report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a record by public id or `namespace/slug`.
    Get {
        target: String,

        #[arg(long)]
        json: bool,
    },

    /// Manage persons.
    Person {
        #[command(subcommand)]
        action: PersonAction,
    },
}

#[derive(Subcommand)]
enum PersonAction {
    /// Register a person and print its public id.
    Add { display_name: String },
    /// Print a person by public id.
    Show { public_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_global_subscriber(LogLevelArgs {
        verbosity: cli.verbose,
        quiet: cli.quiet,
    })?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Create { draft, json } => {
            service::run_create(&cfg, &draft, json).await?;
        }
        Commands::Sync { public_id, json } => {
            service::run_sync(&cfg, &public_id, json).await?;
        }
        Commands::Reconcile { source, json } => {
            service::run_reconcile(&cfg, &source, json).await?;
        }
        Commands::Get { target, json } => {
            get::run_get(&cfg, &target, json).await?;
        }
        Commands::Person { action } => match action {
            PersonAction::Add { display_name } => {
                service::run_add_person(&cfg, &display_name).await?;
            }
            PersonAction::Show { public_id } => {
                service::run_show_person(&cfg, &public_id).await?;
            }
        },
    }

    Ok(())
}
