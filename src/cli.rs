use clap::{Args, Parser, Subcommand};

use crate::types::{LogLevel, UploadFailurePolicy};

#[derive(Parser, Debug)]
#[command(
    name = "photoprism-immich-migrate",
    about = "Migrate albums, photos and locations from PhotoPrism to Immich",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the default `migrate` command
    #[command(flatten)]
    pub migrate: MigrateArgs,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl Cli {
    /// The command to run; a bare invocation means `migrate`.
    pub fn effective_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Migrate(self.migrate.clone()))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reconcile albums, then upload every asset and relink it into its albums
    Migrate(MigrateArgs),
    /// Only create missing albums and print the name -> id mapping
    Albums(AlbumsArgs),
    /// Show the migration ledger summary
    Status(StatusArgs),
    /// Delete the migration ledger
    ResetState(ResetStateArgs),
}

/// Connection settings shared by every command that talks to the services.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// JSON credentials file with `photoprism` and `immich` sections
    #[arg(short = 'c', long = "config", default_value = "env.json")]
    pub config_file: String,

    /// PhotoPrism base URL
    #[arg(long, env = "PHOTOPRISM_URL")]
    pub photoprism_url: Option<String>,

    /// PhotoPrism access token.
    /// WARNING: passing via flag is visible in process listings.
    #[arg(long, env = "PHOTOPRISM_ACCESS_TOKEN", hide_env_values = true)]
    pub photoprism_token: Option<String>,

    /// Immich base URL
    #[arg(long, env = "IMMICH_URL")]
    pub immich_url: Option<String>,

    /// Immich API key.
    /// WARNING: passing via flag is visible in process listings.
    #[arg(long, env = "IMMICH_API_KEY", hide_env_values = true)]
    pub immich_api_key: Option<String>,

    /// Per-request timeout in seconds for API calls
    #[arg(long, default_value_t = 60)]
    pub request_timeout: u64,

    /// Max retries for transient read failures (0 disables)
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Base delay in seconds between retries (doubles each attempt)
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Directory holding the PhotoPrism originals
    #[arg(long, default_value = "/originals")]
    pub originals_dir: String,

    /// Directory where error-logs-*.json files are written
    #[arg(long, default_value = ".")]
    pub log_dir: String,

    /// Path of the migration ledger database
    #[arg(long, default_value = "migration-state.db")]
    pub state_db: String,

    /// Do not read or write the migration ledger
    #[arg(long)]
    pub no_state: bool,

    /// What to do when Immich rejects an upload
    #[arg(long, value_enum, default_value = "halt")]
    pub on_upload_failure: UploadFailurePolicy,

    /// Per-upload timeout in seconds
    #[arg(long, default_value_t = 600)]
    pub upload_timeout: u64,

    /// Report what would be created and uploaded without changing Immich
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AlbumsArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Only list the albums that would be created
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Path of the migration ledger database
    #[arg(long, default_value = "migration-state.db")]
    pub state_db: String,

    /// List assets whose migration failed
    #[arg(long)]
    pub failed: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ResetStateArgs {
    /// Path of the migration ledger database
    #[arg(long, default_value = "migration-state.db")]
    pub state_db: String,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}
