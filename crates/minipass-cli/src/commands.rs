//! One function per subcommand.
//!
//! Every command takes the already-opened [`ConfigStore`] so tests can point
//! it at a temporary directory.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use minipass_vault::config::{KEY_DATABASE_FILE, SECTION_DB};
use minipass_vault::{ConfigStore, SyncClient, Vault, VaultLifecycle, lifecycle};

use crate::cli::{AddArgs, UpdateArgs};
use crate::helpers::{
    check_url, init_report, non_empty, read_line, require_initialized, require_secret,
    revealed_block, summary_line,
};

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

pub fn cmd_init(config: &ConfigStore, dir: Option<&Path>) -> Result<()> {
    let outcome = lifecycle::initialize(config, dir)?;
    println!("{}", init_report(config, &outcome));
    Ok(())
}

/// Works before `init`: an unconfigured vault shows where `init` would put it.
pub fn cmd_paths(config: &ConfigStore) -> Result<()> {
    let vault = match config.get_optional(SECTION_DB, KEY_DATABASE_FILE)? {
        Some(path) => PathBuf::from(path),
        None => config.default_database_file(),
    };
    println!("  Vault:  {}", vault.display());
    println!("  Config: {}", config.config_file().display());
    Ok(())
}

pub fn cmd_remote(config: &ConfigStore, url: &str, token: &str) -> Result<()> {
    require_initialized(config)?;
    config.set_remote_credentials(url, token)?;
    println!("  Remote set to {url}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn open_vault(config: &ConfigStore) -> Result<Vault> {
    require_initialized(config)?;
    Ok(Vault::open(config)?)
}

pub fn cmd_search(config: &ConfigStore, query: &str) -> Result<()> {
    let vault = open_vault(config)?;
    let records = vault.search(query)?;

    match records.as_slice() {
        [] => println!("  No records match \"{query}\"."),
        [record] => {
            let secrets = vault.reveal(record)?;
            println!("{}", revealed_block(record, &secrets));
        }
        _ => {
            for record in &records {
                println!("  {}", summary_line(record));
            }
        }
    }
    Ok(())
}

pub fn cmd_show(config: &ConfigStore, id: i64) -> Result<()> {
    let vault = open_vault(config)?;
    let Some(record) = vault.get_by_id(id)? else {
        bail!("no record with id {id}");
    };
    let secrets = vault.reveal(&record)?;
    println!("{}", revealed_block(&record, &secrets));
    Ok(())
}

pub fn cmd_list(config: &ConfigStore, json: bool) -> Result<()> {
    let vault = open_vault(config)?;
    let records = vault.list_all()?;

    if json {
        let rows: Vec<_> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "name": r.name,
                    "memo": r.memo,
                    "url": r.url,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("  The vault is empty.");
        return Ok(());
    }
    for record in &records {
        println!("  {}", summary_line(record));
    }
    println!();
    println!("  {} record(s)", records.len());
    Ok(())
}

/// Add a record. A missing password is read as one line from `input`.
pub fn cmd_add(config: &ConfigStore, args: AddArgs, input: impl BufRead) -> Result<()> {
    let vault = open_vault(config)?;
    if vault.get_by_name(&args.name)?.is_some() {
        bail!("a record named \"{}\" already exists", args.name);
    }
    check_url(args.url.as_deref())?;
    require_secret("login name", &args.login)?;

    let password = match args.password {
        Some(password) => password,
        None => {
            eprint!("  Password: ");
            read_line(input)?
        }
    };
    require_secret("password", &password)?;
    let memo = non_empty(args.memo);
    let url = non_empty(args.url);

    vault
        .add(
            &args.name,
            &args.login,
            &password,
            memo.as_deref(),
            url.as_deref(),
        )
        .with_context(|| format!("failed to add \"{}\"", args.name))?;

    println!("  Added \"{}\".", args.name);
    Ok(())
}

/// Update a record. Omitted fields keep their stored value; an empty memo
/// or url clears it.
pub fn cmd_update(config: &ConfigStore, args: UpdateArgs) -> Result<()> {
    let vault = open_vault(config)?;
    let Some(record) = vault.get_by_id(args.id)? else {
        bail!("no record with id {}", args.id);
    };
    check_url(args.url.as_deref())?;
    if let Some(login) = &args.login {
        require_secret("login name", login)?;
    }
    if let Some(password) = &args.password {
        require_secret("password", password)?;
    }

    let secrets = vault.reveal(&record)?;
    let name = args.name.unwrap_or(record.name);
    let login = args.login.unwrap_or(secrets.login_name);
    let password = args.password.unwrap_or(secrets.password);
    let memo = match args.memo {
        Some(memo) => non_empty(Some(memo)),
        None => record.memo,
    };
    let url = match args.url {
        Some(url) => non_empty(Some(url)),
        None => record.url,
    };

    vault.update(
        args.id,
        &name,
        &login,
        &password,
        memo.as_deref(),
        url.as_deref(),
    )?;

    println!("  Updated #{} \"{name}\".", args.id);
    Ok(())
}

pub fn cmd_delete(config: &ConfigStore, id: i64, yes: bool) -> Result<()> {
    let vault = open_vault(config)?;
    let Some(record) = vault.get_by_id(id)? else {
        bail!("no record with id {id}");
    };
    if !yes {
        bail!("refusing to delete \"{}\" without --yes", record.name);
    }

    vault.delete(id)?;
    println!("  Deleted #{id} \"{}\".", record.name);
    Ok(())
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub fn cmd_backup(config: &ConfigStore, dest: Option<&Path>) -> Result<()> {
    let vault = open_vault(config)?;
    let written = VaultLifecycle::new(&vault, config).backup(dest)?;
    println!("  Backup written to {}", written.display());
    Ok(())
}

pub fn cmd_destroy(config: &ConfigStore, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to destroy the vault without --yes; this deletes all records");
    }
    let vault = open_vault(config)?;
    VaultLifecycle::new(&vault, config).destroy()?;
    println!("  Vault and configuration deleted.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

pub async fn cmd_upload(config: &ConfigStore) -> Result<()> {
    let vault = open_vault(config)?;
    let client = SyncClient::from_config(config)?;

    println!("  Uploading to {} ...", client.api_url());
    let response = client.upload(vault.path()).await?;
    println!("  Done ({}): {}", response.status, response.body_text());
    Ok(())
}

pub async fn cmd_restore(config: &ConfigStore, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to overwrite the local vault without --yes");
    }
    let vault = open_vault(config)?;
    let client = SyncClient::from_config(config)?;

    println!("  Restoring from {} ...", client.api_url());
    let response = client.restore(vault.path()).await?;
    println!("  Restored ({}).", response.status);
    Ok(())
}
