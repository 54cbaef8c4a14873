//! Encrypted credential vault for minipass.
//!
//! This crate stores name/login/password/memo/url records in a SQLite file.
//! The `login_name` and `password` fields are encrypted at rest with
//! AES-256-GCM under a master key kept in a per-user configuration file;
//! name, memo and url stay in clear so they can be searched.
//!
//! # Modules
//!
//! - [`config`]: sectioned configuration file (vault path, master key,
//!   remote credentials) with atomic writes.
//! - [`crypto`]: AES-256-GCM primitives, master key generation, field tokens.
//! - [`store`]: SQLite-backed record CRUD with per-field encryption.
//! - [`sync`]: upload/restore of the raw vault file to a remote endpoint.
//! - [`lifecycle`]: first-run initialisation, backups, destruction.
//! - [`error`]: unified error type.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use minipass_vault::{ConfigStore, Vault, lifecycle};
//!
//! # fn example() -> minipass_vault::Result<()> {
//! let config = ConfigStore::open_default()?;
//!
//! // First run: creates the vault file and the master key.
//! let init = lifecycle::initialize(&config, None)?;
//! if let Some(key) = init.generated_key {
//!     println!("keep this key safe: {key}");
//! }
//!
//! let vault = Vault::open(&config)?;
//! vault.add("github", "alice", "s3cr3t", None, Some("https://github.com"))?;
//!
//! let hits = vault.search("git")?;
//! assert_eq!(vault.reveal(&hits[0])?.password, "s3cr3t");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod lifecycle;
pub mod store;
pub mod sync;

// Re-export the most commonly used types at the crate root for convenience.
pub use config::{ConfigStore, RemoteCredentials};
pub use crypto::FieldCipher;
pub use error::{Result, VaultError};
pub use lifecycle::{Initialized, VaultLifecycle};
pub use store::{Record, Secrets, Vault};
pub use sync::{RemoteResponse, SyncClient};
