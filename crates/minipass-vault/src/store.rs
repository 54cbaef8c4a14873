//! SQLite-backed credential record store.
//!
//! The [`Vault`] struct knows where the vault database lives and holds the
//! [`FieldCipher`] built from the master key. It keeps no connection open:
//! every public operation opens a fresh connection, runs one statement and
//! drops it, so no lock or transaction spans two logical operations.
//!
//! # Schema
//!
//! A single table, `passwords`:
//!
//! | column       | type                             | notes                 |
//! |--------------|----------------------------------|-----------------------|
//! | `id`         | INTEGER PRIMARY KEY AUTOINCREMENT| never reused          |
//! | `name`       | VARCHAR(200) NOT NULL UNIQUE     | plaintext, searchable |
//! | `login_name` | TEXT NOT NULL                    | encrypted token       |
//! | `password`   | TEXT NOT NULL                    | encrypted token       |
//! | `memo`       | TEXT NULL                        | plaintext, searchable |
//! | `url`        | VARCHAR(255) NULL                | plaintext, searchable |
//!
//! Only `login_name` and `password` are encrypted. Name, memo and url stay
//! in clear so substring search works without decrypting anything.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use serde::Serialize;

use crate::config::{ConfigStore, KEY_AES_KEY, SECTION_COMMON};
use crate::crypto::FieldCipher;
use crate::error::{Result, VaultError};

/// Name of the table holding the records.
pub const TABLE_NAME: &str = "passwords";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS passwords (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       VARCHAR(200) NOT NULL UNIQUE,
    login_name TEXT NOT NULL,
    password   TEXT NOT NULL,
    memo       TEXT NULL,
    url        VARCHAR(255) NULL
);";

const SELECT_COLUMNS: &str = "SELECT id, name, login_name, password, memo, url FROM passwords";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One credential entry as stored on disk.
///
/// `login_name` and `password` hold ciphertext tokens; use
/// [`Vault::reveal`] or [`Vault::decrypt_field`] to read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: i64,
    pub name: String,
    pub login_name: String,
    pub password: String,
    pub memo: Option<String>,
    pub url: Option<String>,
}

impl Record {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            login_name: row.get(2)?,
            password: row.get(3)?,
            memo: row.get(4)?,
            url: row.get(5)?,
        })
    }
}

/// Decrypted secrets of one record. Only ever held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub login_name: String,
    pub password: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("login_name", &self.login_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Encrypted credential record store backed by a SQLite file.
///
/// # Example
///
/// ```rust,no_run
/// # use minipass_vault::{ConfigStore, Vault};
/// # fn example() -> minipass_vault::Result<()> {
/// let config = ConfigStore::open_default()?;
/// let vault = Vault::open(&config)?;
///
/// vault.add("github", "alice", "s3cr3t", None, Some("https://github.com"))?;
///
/// for record in vault.search("git")? {
///     let secrets = vault.reveal(&record)?;
///     println!("{} -> {}", record.name, secrets.login_name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Vault {
    path: PathBuf,
    cipher: FieldCipher,
}

impl Vault {
    /// Build a vault from the configured database path and master key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingConfig`] when either setting is absent
    /// and [`VaultError::InvalidMasterKey`] when the key cannot be decoded.
    pub fn open(config: &ConfigStore) -> Result<Self> {
        let path = config.database_file()?;
        let cipher = FieldCipher::from_encoded(&config.get(SECTION_COMMON, KEY_AES_KEY)?)?;

        tracing::debug!(path = %path.display(), "vault opened");
        Ok(Self::with_cipher(path, cipher))
    }

    /// Build a vault over an existing database file with an explicit cipher.
    pub fn with_cipher(path: impl Into<PathBuf>, cipher: FieldCipher) -> Self {
        Self {
            path: path.into(),
            cipher,
        }
    }

    /// Create the database file at `path` (if needed) and its schema.
    pub fn create_database(path: &Path) -> Result<()> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = %path.display(), "vault schema ready");
        Ok(())
    }

    /// Location of the vault database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection to the existing database. Never creates the file.
    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(
            "PRAGMA synchronous = FULL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(conn)
    }

    // -- Record CRUD --------------------------------------------------------

    /// Insert a new record, encrypting `login_name` and `password`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DuplicateName`] if a record with `name` exists.
    pub fn add(
        &self,
        name: &str,
        login_name: &str,
        password: &str,
        memo: Option<&str>,
        url: Option<&str>,
    ) -> Result<()> {
        check_name(name)?;
        let login_name = self.cipher.encrypt_field(login_name)?;
        let password = self.cipher.encrypt_field(password)?;

        self.connect()?
            .execute(
                "INSERT INTO passwords (name, login_name, password, memo, url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, login_name, password, memo, url],
            )
            .map_err(|e| unique_violation(e, name))?;

        tracing::info!(name, "record added");
        Ok(())
    }

    /// Case-insensitive substring search over `name`, `url` and `memo`.
    ///
    /// Case folding is SQLite `LIKE`'s: ASCII letters only, so `"übersee"`
    /// does not match `"Übersee"`. `%`, `_` and `\` in `query` match
    /// literally.
    ///
    /// Secrets in the returned records are still encrypted.
    pub fn search(&self, query: &str) -> Result<Vec<Record>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS}
             WHERE name LIKE ?1 ESCAPE '\\'
                OR url  LIKE ?1 ESCAPE '\\'
                OR memo LIKE ?1 ESCAPE '\\'
             ORDER BY id"
        ))?;

        let records = stmt
            .query_map(params![like_pattern(query)], Record::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!(count = records.len(), "search complete");
        Ok(records)
    }

    /// Look up a record by id.
    pub fn get_by_id(&self, id: i64) -> Result<Option<Record>> {
        let record = self
            .connect()?
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                Record::from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Look up a record by its unique name.
    pub fn get_by_name(&self, name: &str) -> Result<Option<Record>> {
        let record = self
            .connect()?
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE name = ?1"),
                params![name],
                Record::from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Every record, ordered by id.
    pub fn list_all(&self) -> Result<Vec<Record>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;

        let records = stmt
            .query_map([], Record::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!(count = records.len(), "listed records");
        Ok(records)
    }

    /// Overwrite every field of record `id`, re-encrypting the secrets.
    ///
    /// An unknown `id` touches zero rows and is not an error; check with
    /// [`get_by_id`](Self::get_by_id) first when existence matters.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DuplicateName`] when renaming onto a name held
    /// by another record.
    pub fn update(
        &self,
        id: i64,
        name: &str,
        login_name: &str,
        password: &str,
        memo: Option<&str>,
        url: Option<&str>,
    ) -> Result<()> {
        check_name(name)?;
        let login_name = self.cipher.encrypt_field(login_name)?;
        let password = self.cipher.encrypt_field(password)?;

        let rows = self
            .connect()?
            .execute(
                "UPDATE passwords
                 SET name = ?1, login_name = ?2, password = ?3, memo = ?4, url = ?5
                 WHERE id = ?6",
                params![name, login_name, password, memo, url, id],
            )
            .map_err(|e| unique_violation(e, name))?;

        if rows == 0 {
            tracing::debug!(id, "update matched no record");
        } else {
            tracing::info!(id, name, "record updated");
        }
        Ok(())
    }

    /// Delete record `id`. Deleting an unknown id is a no-op.
    pub fn delete(&self, id: i64) -> Result<()> {
        let rows = self
            .connect()?
            .execute("DELETE FROM passwords WHERE id = ?1", params![id])?;

        tracing::info!(id, deleted = rows, "record deleted");
        Ok(())
    }

    // -- Field crypto -------------------------------------------------------

    /// Encrypt one field under this vault's master key.
    pub fn encrypt_field(&self, plaintext: &str) -> Result<String> {
        self.cipher.encrypt_field(plaintext)
    }

    /// Decrypt one field token under this vault's master key.
    pub fn decrypt_field(&self, ciphertext: &str) -> Result<String> {
        self.cipher.decrypt_field(ciphertext)
    }

    /// Decrypt both secrets of `record`.
    pub fn reveal(&self, record: &Record) -> Result<Secrets> {
        Ok(Secrets {
            login_name: self.decrypt_field(&record.login_name)?,
            password: self.decrypt_field(&record.password)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VaultError::InvalidArgument("record name is required".into()));
    }
    Ok(())
}

/// Map a UNIQUE constraint failure on `name` to [`VaultError::DuplicateName`].
fn unique_violation(err: rusqlite::Error, name: &str) -> VaultError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            VaultError::DuplicateName {
                name: name.to_string(),
            }
        }
        other => other.into(),
    }
}

/// `%query%` with LIKE metacharacters escaped by `\`.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
