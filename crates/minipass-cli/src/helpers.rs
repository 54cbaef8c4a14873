//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration loading, input validation
//! and record formatting.

use std::io::{self, BufRead};
use std::path::Path;

use anyhow::{Context, Result, bail};
use minipass_vault::config::parse_http_url;
use minipass_vault::{ConfigStore, Initialized, Record, Secrets};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Map `-v` repetitions to a default filter level.
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` takes precedence over the
/// given default level. Logs go to stderr so stdout stays scriptable.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Open the configuration in `home`, or in the default per-user location.
pub fn open_config(home: Option<&Path>) -> Result<ConfigStore> {
    let config = match home {
        Some(dir) => ConfigStore::open(dir),
        None => ConfigStore::open_default(),
    };
    config.context("failed to open configuration")
}

/// Fail with a hint unless `minipass init` has been run.
pub fn require_initialized(config: &ConfigStore) -> Result<()> {
    if !config.is_initialized()? {
        bail!(
            "vault is not initialized ({}); run `minipass init` first",
            config.config_file().display()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Reject a url that is present but not an absolute http(s) url.
pub fn check_url(url: Option<&str>) -> Result<()> {
    if let Some(url) = url.filter(|u| !u.is_empty()) {
        parse_http_url(url)?;
    }
    Ok(())
}

/// Login names and passwords must not be empty.
pub fn require_secret(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        bail!("{field} is required");
    }
    Ok(())
}

/// Empty strings mean "no value".
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Read one line from `input` without its trailing newline.
pub fn read_line(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// What `init` prints. A freshly generated master key is shown here and
/// nowhere else.
pub fn init_report(config: &ConfigStore, outcome: &Initialized) -> String {
    let mut lines = vec![
        String::new(),
        format!("  Vault:  {}", outcome.database_file.display()),
        format!("  Config: {}", config.config_file().display()),
    ];
    match &outcome.generated_key {
        Some(key) => {
            lines.push(String::new());
            lines.push("  Master key generated. Keep it in a safe place:".into());
            lines.push(String::new());
            lines.push(format!("    {key}"));
            lines.push(String::new());
            lines.push("  Backups and restored vaults cannot be read without it.".into());
        }
        None => lines.push("  Already initialized; existing master key kept.".into()),
    }
    lines.push(String::new());
    lines.join("\n")
}

/// One-line summary of a record without secrets.
pub fn summary_line(record: &Record) -> String {
    format!(
        "#{} | name: {} | url: {} | {}",
        record.id,
        record.name,
        record.url.as_deref().unwrap_or(""),
        record.memo.as_deref().unwrap_or("")
    )
}

/// Full view of a record with its decrypted secrets.
pub fn revealed_block(record: &Record, secrets: &Secrets) -> String {
    format!(
        "+++++++++++++++++++++++++++++++\n\
         \n  login name: {}\n  password:   {}\n\n\
         \x20 id:   {}\n  name: {}\n  url:  {}\n  memo: {}\n\
         +++++++++++++++++++++++++++++++",
        secrets.login_name,
        secrets.password,
        record.id,
        record.name,
        record.url.as_deref().unwrap_or(""),
        record.memo.as_deref().unwrap_or("")
    )
}
