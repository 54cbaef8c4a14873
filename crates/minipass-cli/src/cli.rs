//! CLI argument definitions for minipass.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// minipass -- a local encrypted password vault.
#[derive(Parser)]
#[command(
    name = "minipass",
    version,
    about = "minipass -- local encrypted password vault",
    long_about = "Stores logins and passwords in a local SQLite vault. Login names and \
                  passwords are encrypted with a master key kept in the configuration file; \
                  names, urls and memos stay searchable."
)]
pub struct Cli {
    /// Directory holding the configuration file (default: ~/.minipassword).
    #[arg(long, global = true, env = "MINIPASS_HOME")]
    pub home: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the vault and master key on first run.
    Init {
        /// Directory for the vault file (default: the configuration directory).
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Search names, urls and memos.
    Search {
        /// Case-insensitive substring to look for.
        query: String,
    },

    /// Show one record with its decrypted login and password.
    Show {
        /// Record id.
        id: i64,
    },

    /// List every record (secrets stay hidden).
    List {
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add a new record.
    Add(AddArgs),

    /// Change an existing record. Omitted fields keep their value.
    Update(UpdateArgs),

    /// Delete a record.
    Delete {
        /// Record id.
        id: i64,
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Print the vault and configuration file paths.
    Paths,

    /// Copy the vault file.
    Backup {
        /// Destination file (default: next to the vault, timestamped).
        #[arg(long)]
        dest: Option<PathBuf>,
    },

    /// Set the remote backup API url and token.
    Remote {
        /// Remote API url.
        #[arg(long)]
        url: String,
        /// Bearer token for the remote API.
        #[arg(long)]
        token: String,
    },

    /// Upload the vault file to the remote API.
    Upload,

    /// Replace the local vault with the remote copy.
    Restore {
        /// Confirm overwriting the local vault.
        #[arg(long)]
        yes: bool,
    },

    /// Delete the vault and configuration. All data is lost.
    Destroy {
        /// Confirm the destruction.
        #[arg(long)]
        yes: bool,
    },
}

/// Fields of a new record.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Unique record name.
    #[arg(long, short)]
    pub name: String,
    /// Login name.
    #[arg(long, short)]
    pub login: String,
    /// Password. Read from stdin when omitted.
    #[arg(long, short)]
    pub password: Option<String>,
    /// Free-form memo.
    #[arg(long, short)]
    pub memo: Option<String>,
    /// Site url.
    #[arg(long, short)]
    pub url: Option<String>,
}

/// Fields to change on an existing record. An empty memo or url clears it.
#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Record id.
    pub id: i64,
    #[arg(long, short)]
    pub name: Option<String>,
    #[arg(long, short)]
    pub login: Option<String>,
    #[arg(long, short)]
    pub password: Option<String>,
    #[arg(long, short)]
    pub memo: Option<String>,
    #[arg(long, short)]
    pub url: Option<String>,
}
