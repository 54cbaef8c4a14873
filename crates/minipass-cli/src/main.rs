//! minipass CLI -- entry point.
//!
//! Parses arguments, sets up logging, opens the configuration and hands off
//! to the matching command in [`commands`].

mod cli;
mod commands;
mod helpers;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    helpers::init_tracing(helpers::level_for(cli.verbose));

    let config = helpers::open_config(cli.home.as_deref())?;
    tracing::debug!(config = %config.config_file().display(), "configuration opened");

    match cli.command {
        Commands::Init { dir } => commands::cmd_init(&config, dir.as_deref()),
        Commands::Search { query } => commands::cmd_search(&config, &query),
        Commands::Show { id } => commands::cmd_show(&config, id),
        Commands::List { json } => commands::cmd_list(&config, json),
        Commands::Add(args) => commands::cmd_add(&config, args, std::io::stdin().lock()),
        Commands::Update(args) => commands::cmd_update(&config, args),
        Commands::Delete { id, yes } => commands::cmd_delete(&config, id, yes),
        Commands::Paths => commands::cmd_paths(&config),
        Commands::Backup { dest } => commands::cmd_backup(&config, dest.as_deref()),
        Commands::Remote { url, token } => commands::cmd_remote(&config, &url, &token),
        Commands::Upload => commands::cmd_upload(&config).await,
        Commands::Restore { yes } => commands::cmd_restore(&config, yes).await,
        Commands::Destroy { yes } => commands::cmd_destroy(&config, yes),
    }
}
