//! Vault lifecycle: first-run initialisation, backups and destruction.
//!
//! # Operational invariant
//!
//! The master key lives only in the configuration file. Backups copy the
//! vault file alone, and remote restore replaces the vault file alone, so a
//! backup without the original `aes_key` cannot be decrypted. Users must keep
//! the key somewhere safe independently of any backup.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::{ConfigStore, KEY_AES_KEY, KEY_DATABASE_FILE, SECTION_COMMON, SECTION_DB};
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::store::Vault;

/// Outcome of [`initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initialized {
    /// The configured vault file.
    pub database_file: PathBuf,
    /// The master key, when this call generated it. `None` when a key was
    /// already configured.
    pub generated_key: Option<String>,
}

/// Bring `config` to an initialised state.
///
/// Creates the vault database in `dir` (default: the config directory) when
/// no vault is configured, and generates a master key when none is stored.
/// An existing master key is never replaced.
pub fn initialize(config: &ConfigStore, dir: Option<&Path>) -> Result<Initialized> {
    let database_file = match config.get_optional(SECTION_DB, KEY_DATABASE_FILE)? {
        Some(existing) => PathBuf::from(existing),
        None => config.initialize_vault(dir)?,
    };

    let generated_key = match config.get_optional(SECTION_COMMON, KEY_AES_KEY)? {
        Some(_) => None,
        None => {
            let key = crypto::generate_key()?;
            config.set(SECTION_COMMON, KEY_AES_KEY, &key)?;
            tracing::info!("master key generated");
            Some(key)
        }
    };

    Ok(Initialized {
        database_file,
        generated_key,
    })
}

/// Backup and destruction of one vault and its configuration.
pub struct VaultLifecycle<'a> {
    vault: &'a Vault,
    config: &'a ConfigStore,
}

impl<'a> VaultLifecycle<'a> {
    pub fn new(vault: &'a Vault, config: &'a ConfigStore) -> Self {
        Self { vault, config }
    }

    /// Copy the vault file byte for byte to `destination`, or next to the
    /// vault as `<stem>_bak_<UTC YYYYMMDDHHMMSS><.ext>` when none is given.
    ///
    /// A default name never overwrites an earlier backup: a second backup in
    /// the same second gets a `_1`, `_2`, ... suffix on the stamp. An
    /// explicit `destination` is overwritten.
    ///
    /// Returns the path written. The configuration file is not copied.
    pub fn backup(&self, destination: Option<&Path>) -> Result<PathBuf> {
        let (destination, bytes) = match destination {
            Some(path) => (path.to_path_buf(), std::fs::copy(self.vault.path(), path)?),
            None => {
                let stamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
                copy_to_new_backup(self.vault.path(), &stamp)?
            }
        };

        tracing::info!(
            source = %self.vault.path().display(),
            destination = %destination.display(),
            bytes,
            "vault backed up"
        );
        Ok(destination)
    }

    /// Irreversibly delete the vault file, the default vault file in the
    /// config directory, their SQLite journals and default-named backups,
    /// and the configuration file.
    ///
    /// Other files in the config directory are left alone; it may be a
    /// directory shared with unrelated data.
    pub fn destroy(self) -> Result<()> {
        let default_file = self.config.default_database_file();

        for database in [self.vault.path(), default_file.as_path()] {
            for path in with_sidecars(database) {
                remove_if_present(&path)?;
            }
            remove_default_backups(database)?;
        }

        remove_if_present(self.config.config_file())?;

        tracing::warn!(
            vault = %self.vault.path().display(),
            data_dir = %self.config.data_dir().display(),
            "vault destroyed"
        );
        Ok(())
    }
}

/// Suffixes SQLite appends to a database path for its journal files.
const SQLITE_SIDECARS: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Upper bound on `_N` suffixes tried for one timestamp.
const MAX_BACKUPS_PER_STAMP: u32 = 1000;

/// Copy `vault_file` to the first free default backup name for `stamp`.
fn copy_to_new_backup(vault_file: &Path, stamp: &str) -> Result<(PathBuf, u64)> {
    let mut source = File::open(vault_file)?;

    for n in 0..MAX_BACKUPS_PER_STAMP {
        let tag = if n == 0 {
            stamp.to_string()
        } else {
            format!("{stamp}_{n}")
        };
        let path = default_backup_path(vault_file, &tag);

        let mut target = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        };
        let bytes = io::copy(&mut source, &mut target)?;
        target.sync_all()?;
        return Ok((path, bytes));
    }

    Err(VaultError::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free backup name for stamp {stamp}"),
    )))
}

/// `database` followed by its SQLite journal paths.
fn with_sidecars(database: &Path) -> Vec<PathBuf> {
    let mut paths = vec![database.to_path_buf()];
    for suffix in SQLITE_SIDECARS {
        let mut name = database.as_os_str().to_owned();
        name.push(suffix);
        paths.push(PathBuf::from(name));
    }
    paths
}

/// Remove `<stem>_bak_*` files beside `database`.
fn remove_default_backups(database: &Path) -> Result<()> {
    let Some(stem) = database.file_stem() else {
        return Ok(());
    };
    let prefix = format!("{}_bak_", stem.to_string_lossy());
    let dir = match database.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let is_backup = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(&prefix));
        let path = entry.path();
        if is_backup && path.is_file() {
            remove_if_present(&path)?;
        }
    }
    Ok(())
}

/// `<dir>/<stem>_bak_<stamp><.ext>` for `vault_file`.
fn default_backup_path(vault_file: &Path, stamp: &str) -> PathBuf {
    let stem = vault_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = vault_file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    vault_file.with_file_name(format!("{stem}_bak_{stamp}{extension}"))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ConfigStore, Vault) {
        let dir = TempDir::new().unwrap();
        let config = ConfigStore::open(dir.path().join("home")).unwrap();
        initialize(&config, None).unwrap();
        let vault = Vault::open(&config).unwrap();
        (dir, config, vault)
    }

    #[test]
    fn initialize_generates_key_once() {
        let dir = TempDir::new().unwrap();
        let config = ConfigStore::open(dir.path()).unwrap();

        let first = initialize(&config, None).unwrap();
        let key = first.generated_key.clone().unwrap();
        assert!(first.database_file.is_file());
        assert!(config.is_initialized().unwrap());

        let second = initialize(&config, None).unwrap();
        assert_eq!(second.generated_key, None);
        assert_eq!(second.database_file, first.database_file);
        assert_eq!(config.get(SECTION_COMMON, KEY_AES_KEY).unwrap(), key);
    }

    #[test]
    fn initialize_keeps_existing_key() {
        let dir = TempDir::new().unwrap();
        let config = ConfigStore::open(dir.path()).unwrap();
        let key = crypto::generate_key().unwrap();
        config.set(SECTION_COMMON, KEY_AES_KEY, &key).unwrap();

        let result = initialize(&config, Some(&dir.path().join("data"))).unwrap();
        assert_eq!(result.generated_key, None);
        assert_eq!(
            result.database_file,
            dir.path().join("data").join("minipassword.db")
        );
        assert_eq!(config.get(SECTION_COMMON, KEY_AES_KEY).unwrap(), key);
    }

    #[test]
    fn default_backup_name() {
        let path = default_backup_path(Path::new("/v/minipassword.db"), "20240102030405");
        assert_eq!(path, Path::new("/v/minipassword_bak_20240102030405.db"));

        let bare = default_backup_path(Path::new("/v/vault"), "20240102030405");
        assert_eq!(bare, Path::new("/v/vault_bak_20240102030405"));
    }

    #[test]
    fn backup_to_explicit_destination() {
        let (dir, config, vault) = setup();
        vault.add("github", "alice", "s3cr3t", None, None).unwrap();

        let dest = dir.path().join("copy.db");
        let written = VaultLifecycle::new(&vault, &config).backup(Some(&dest)).unwrap();

        assert_eq!(written, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), std::fs::read(vault.path()).unwrap());
    }

    #[test]
    fn backup_of_missing_vault_fails() {
        let (_dir, config, vault) = setup();
        std::fs::remove_file(vault.path()).unwrap();

        let err = VaultLifecycle::new(&vault, &config).backup(None).unwrap_err();
        assert!(matches!(err, VaultError::Io(_)));
    }

    #[test]
    fn default_backups_never_overwrite() {
        let (_dir, config, vault) = setup();
        let lifecycle = VaultLifecycle::new(&vault, &config);

        let stamp = "20240102030405";
        let (first, _) = copy_to_new_backup(vault.path(), stamp).unwrap();
        std::fs::write(&first, b"earlier backup").unwrap();
        let (second, _) = copy_to_new_backup(vault.path(), stamp).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            second.file_name().unwrap(),
            "minipassword_bak_20240102030405_1.db"
        );
        assert_eq!(std::fs::read(&first).unwrap(), b"earlier backup");
        assert_eq!(std::fs::read(&second).unwrap(), std::fs::read(vault.path()).unwrap());

        let a = lifecycle.backup(None).unwrap();
        let b = lifecycle.backup(None).unwrap();
        assert_ne!(a, b);
        assert!(a.is_file() && b.is_file());
    }

    #[test]
    fn destroy_removes_vault_and_config() {
        let (dir, config, vault) = setup();
        let outside = dir.path().join("outside.db");
        std::fs::copy(vault.path(), &outside).unwrap();
        std::fs::write(dir.path().join("outside.db-journal"), "j").unwrap();
        std::fs::write(dir.path().join("outside_bak_20240102030405.db"), "b").unwrap();
        let custom = Vault::with_cipher(&outside, crypto::FieldCipher::new([1; crypto::KEY_LEN]));

        let backup = VaultLifecycle::new(&vault, &config).backup(None).unwrap();
        std::fs::write(config.data_dir().join("minipassword.db-wal"), "w").unwrap();

        VaultLifecycle::new(&custom, &config).destroy().unwrap();

        assert!(!outside.exists());
        assert!(!dir.path().join("outside.db-journal").exists());
        assert!(!dir.path().join("outside_bak_20240102030405.db").exists());
        assert!(!vault.path().exists());
        assert!(!backup.exists());
        assert!(!config.data_dir().join("minipassword.db-wal").exists());
        assert!(!config.config_file().exists());
        assert!(!config.is_initialized().unwrap());
    }

    #[test]
    fn destroy_spares_unrelated_files_in_shared_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".bashrc"), "export X=1").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("keep")).unwrap();

        let config = ConfigStore::open(dir.path()).unwrap();
        initialize(&config, Some(&dir.path().join("vaults"))).unwrap();
        let vault = Vault::open(&config).unwrap();

        VaultLifecycle::new(&vault, &config).destroy().unwrap();

        assert!(!vault.path().exists());
        assert!(!config.config_file().exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".bashrc")).unwrap(),
            "export X=1"
        );
        assert!(dir.path().join("notes.txt").is_file());
        assert!(dir.path().join("keep").is_dir());
    }
}
