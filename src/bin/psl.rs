use anyhow::Result;
use clap::{Parser, Subcommand};

use psn_librarian::api::ApiServer;
use psn_librarian::cli::library as commands;
use psn_librarian::storage::Storage;
use psn_librarian::tracing::init_tracing;
use psn_client::{PsnClient, PsnConfig};

#[derive(Parser, Debug)]
#[command(name = "psl", version, about = "PSN library sync CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Exchange a fresh NPSSO for auth tokens and store them
    Login {
        /// PSN online id of the account
        #[arg(long)]
        username: String,
        /// NPSSO cookie value copied from a logged-in browser session
        #[arg(long)]
        npsso: String,
    },
    /// Force an access-token refresh using the stored refresh token
    Refresh,
    /// Print the stored user's profile
    Profile,
    /// Fetch all three sources and rebuild the canonical library
    Sync,
    /// Rebuild the canonical library from the local raw snapshots (offline)
    Merge,
    /// Print entries from the canonical library file
    Show {
        /// Maximum number of entries to print
        #[arg(long)]
        limit: Option<usize>,
        /// Platform filter, e.g. PS5
        #[arg(long)]
        platform: Option<String>,
        /// Case-insensitive substring of the display name
        #[arg(long)]
        search: Option<String>,
    },
    /// Run the HTTP API server
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info")?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Login { username, npsso } => commands::run_login(username, npsso).await,
        Commands::Refresh => commands::run_refresh().await,
        Commands::Profile => commands::run_profile().await,
        Commands::Sync => commands::run_sync().await,
        Commands::Merge => commands::run_merge(),
        Commands::Show {
            limit,
            platform,
            search,
        } => commands::run_show(commands::ShowCommandConfig {
            limit,
            platform,
            search,
        }),
        Commands::Serve => {
            let server = ApiServer::from_env()?;
            server
                .run(Storage::from_env(), PsnClient::new(PsnConfig::default()))
                .await
        }
    }
}
