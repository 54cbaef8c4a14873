//! Sectioned configuration file holding the vault path, master key and
//! remote sync credentials.
//!
//! The file is TOML with one table per section:
//!
//! ```toml
//! [common]
//! aes_key = "..."
//! cloud_api = "https://backup.example.com/vault"
//! cloud_token = "..."
//!
//! [db]
//! database_file = "/home/alice/.minipassword/minipassword.db"
//! ```
//!
//! [`ConfigStore`] never caches the document: every read goes to disk so
//! hand edits are picked up, and every write replaces the file atomically
//! (temporary file in the same directory, then rename) so the file is never
//! left half-written.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};
use crate::store::Vault;

/// Directory under the home directory that holds config and vault.
pub const DATA_DIR_NAME: &str = ".minipassword";

/// File name of the configuration file inside the data directory.
pub const CONFIG_FILENAME: &str = "config.toml";

/// File name of the vault database created by [`ConfigStore::initialize_vault`].
pub const DB_FILENAME: &str = "minipassword.db";

pub const SECTION_COMMON: &str = "common";
pub const SECTION_DB: &str = "db";

pub const KEY_AES_KEY: &str = "aes_key";
pub const KEY_CLOUD_API: &str = "cloud_api";
pub const KEY_CLOUD_TOKEN: &str = "cloud_token";
pub const KEY_DATABASE_FILE: &str = "database_file";

type Document = BTreeMap<String, BTreeMap<String, String>>;

/// Remote endpoint and bearer token used by [`SyncClient`](crate::sync::SyncClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub api_url: String,
    pub token: String,
}

/// Handle to the configuration file of one vault.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    data_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    /// Open the configuration stored in `data_dir`, creating the directory
    /// and an empty configuration file if they do not exist yet.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let store = Self {
            config_file: data_dir.join(CONFIG_FILENAME),
            data_dir,
        };

        if !store.config_file.exists() {
            let mut doc = Document::new();
            doc.insert(SECTION_COMMON.to_string(), BTreeMap::new());
            doc.insert(SECTION_DB.to_string(), BTreeMap::new());
            store.save(&doc)?;
            tracing::info!(path = %store.config_file.display(), "created configuration file");
        }

        Ok(store)
    }

    /// Open the configuration in the default per-user location.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_dir()?)
    }

    /// `<home>/.minipassword`.
    pub fn default_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(DATA_DIR_NAME))
            .ok_or(VaultError::HomeDirUnavailable)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Where [`initialize_vault`](Self::initialize_vault) puts the vault
    /// when no directory is given.
    pub fn default_database_file(&self) -> PathBuf {
        self.data_dir.join(DB_FILENAME)
    }

    // -- Key/value access ---------------------------------------------------

    /// Read `key` from `section`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingConfig`] when the section or key does not
    /// exist.
    pub fn get(&self, section: &str, key: &str) -> Result<String> {
        self.get_optional(section, key)?
            .ok_or_else(|| VaultError::missing(section, key))
    }

    /// Read `key` from `section`, returning `None` when it is absent.
    pub fn get_optional(&self, section: &str, key: &str) -> Result<Option<String>> {
        let doc = self.load()?;
        Ok(doc.get(section).and_then(|s| s.get(key)).cloned())
    }

    /// Write `key = value` into `section` and persist the whole file.
    ///
    /// The value is stored verbatim.
    pub fn set(&self, section: &str, key: &str, value: &str) -> Result<()> {
        let mut doc = self.load()?;
        doc.entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.save(&doc)?;

        tracing::debug!(section, key, "configuration updated");
        Ok(())
    }

    // -- Vault bootstrap ----------------------------------------------------

    /// Both the vault path and the master key are configured.
    pub fn is_initialized(&self) -> Result<bool> {
        let doc = self.load()?;
        let has = |section: &str, key: &str| {
            doc.get(section).is_some_and(|s| s.contains_key(key))
        };
        Ok(has(SECTION_DB, KEY_DATABASE_FILE) && has(SECTION_COMMON, KEY_AES_KEY))
    }

    /// The configured vault file.
    pub fn database_file(&self) -> Result<PathBuf> {
        self.get(SECTION_DB, KEY_DATABASE_FILE).map(PathBuf::from)
    }

    /// Create an empty vault database in `dir` (default: the data directory)
    /// and record its path under `db.database_file`.
    ///
    /// Creating the schema again is harmless. Pointing an already configured
    /// store at a different file is allowed but logged; callers that care
    /// should check [`is_initialized`](Self::is_initialized) first.
    pub fn initialize_vault(&self, dir: Option<&Path>) -> Result<PathBuf> {
        let dir = dir.map_or_else(|| self.data_dir.clone(), Path::to_path_buf);
        std::fs::create_dir_all(&dir)?;

        let database_file = dir.join(DB_FILENAME);
        let database_str = database_file.to_str().ok_or_else(|| {
            VaultError::InvalidArgument(format!(
                "vault path is not valid UTF-8: {}",
                database_file.display()
            ))
        })?;

        if let Some(existing) = self.get_optional(SECTION_DB, KEY_DATABASE_FILE)? {
            if Path::new(&existing) != database_file {
                tracing::warn!(
                    previous = %existing,
                    new = %database_file.display(),
                    "re-pointing configuration at a different vault file"
                );
            }
        }

        Vault::create_database(&database_file)?;
        self.set(SECTION_DB, KEY_DATABASE_FILE, database_str)?;

        tracing::info!(path = %database_file.display(), "vault database initialized");
        Ok(database_file)
    }

    // -- Remote credentials -------------------------------------------------

    /// Store the remote backup endpoint and its bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidUrl`] when `api_url` is not an absolute
    /// http(s) URL and [`VaultError::InvalidArgument`] for an empty token.
    pub fn set_remote_credentials(&self, api_url: &str, token: &str) -> Result<()> {
        parse_http_url(api_url)?;
        if token.trim().is_empty() {
            return Err(VaultError::InvalidArgument(
                "cloud API token must not be empty".into(),
            ));
        }

        // One save, so the url and token never disagree on disk.
        let mut doc = self.load()?;
        let common = doc.entry(SECTION_COMMON.to_string()).or_default();
        common.insert(KEY_CLOUD_API.to_string(), api_url.to_string());
        common.insert(KEY_CLOUD_TOKEN.to_string(), token.to_string());
        self.save(&doc)?;

        tracing::info!(api_url, "remote credentials stored");
        Ok(())
    }

    /// The stored remote endpoint and token.
    pub fn remote_credentials(&self) -> Result<RemoteCredentials> {
        Ok(RemoteCredentials {
            api_url: self.get(SECTION_COMMON, KEY_CLOUD_API)?,
            token: self.get(SECTION_COMMON, KEY_CLOUD_TOKEN)?,
        })
    }

    // -- Internal helpers ---------------------------------------------------

    /// Read the document from disk. A missing file reads as empty.
    fn load(&self) -> Result<Document> {
        let contents = match std::fs::read_to_string(&self.config_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&contents)?)
    }

    /// Replace the file with `doc` via temp file + rename.
    fn save(&self, doc: &Document) -> Result<()> {
        let contents = toml::to_string_pretty(doc)?;

        std::fs::create_dir_all(&self.data_dir)?;
        // NamedTempFile is created with mode 0600 on Unix; the rename keeps it.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.data_dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.config_file).map_err(|e| VaultError::Io(e.error))?;

        Ok(())
    }
}

/// Parse `raw` as an absolute `http` or `https` URL.
pub fn parse_http_url(raw: &str) -> Result<url::Url> {
    let invalid = |reason: String| VaultError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".into()));
    }
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join(DATA_DIR_NAME)).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_directory_and_file() {
        let (_dir, store) = test_store();
        assert!(store.data_dir().is_dir());
        assert!(store.config_file().is_file());

        let contents = std::fs::read_to_string(store.config_file()).unwrap();
        assert!(contents.contains("[common]"));
        assert!(contents.contains("[db]"));
    }

    #[test]
    fn get_missing_key_is_missing_config() {
        let (_dir, store) = test_store();

        let err = store.get(SECTION_COMMON, KEY_AES_KEY).unwrap_err();
        assert!(matches!(
            err,
            VaultError::MissingConfig { ref section, ref key }
                if section == "common" && key == "aes_key"
        ));
        assert!(store.get("nope", "nothing").is_err());
        assert!(!store.is_initialized().unwrap());
    }

    #[test]
    fn set_then_get_from_disk() {
        let (_dir, store) = test_store();
        store.set(SECTION_COMMON, KEY_CLOUD_API, "https://example.com").unwrap();

        let reopened = ConfigStore::open(store.data_dir()).unwrap();
        assert_eq!(
            reopened.get(SECTION_COMMON, KEY_CLOUD_API).unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn set_preserves_other_entries() {
        let (_dir, store) = test_store();
        store.set(SECTION_COMMON, KEY_AES_KEY, "key-material").unwrap();
        store.set(SECTION_DB, KEY_DATABASE_FILE, "/tmp/v.db").unwrap();
        store.set(SECTION_COMMON, KEY_CLOUD_TOKEN, "tok").unwrap();

        assert_eq!(store.get(SECTION_COMMON, KEY_AES_KEY).unwrap(), "key-material");
        assert_eq!(store.get(SECTION_DB, KEY_DATABASE_FILE).unwrap(), "/tmp/v.db");
        assert!(store.is_initialized().unwrap());
    }

    #[test]
    fn external_edits_are_picked_up() {
        let (_dir, store) = test_store();
        store.set(SECTION_COMMON, KEY_CLOUD_TOKEN, "old").unwrap();

        std::fs::write(
            store.config_file(),
            "[common]\ncloud_token = \"edited by hand\"\n",
        )
        .unwrap();

        assert_eq!(
            store.get(SECTION_COMMON, KEY_CLOUD_TOKEN).unwrap(),
            "edited by hand"
        );
    }

    #[test]
    fn master_key_is_stored_verbatim() {
        let (_dir, store) = test_store();
        let opaque = "  not-even-base64 = \"quoted\"  ";
        store.set(SECTION_COMMON, KEY_AES_KEY, opaque).unwrap();
        assert_eq!(store.get(SECTION_COMMON, KEY_AES_KEY).unwrap(), opaque);
    }

    #[test]
    fn malformed_file_is_config_format_error() {
        let (_dir, store) = test_store();
        std::fs::write(store.config_file(), "[common\naes_key = ").unwrap();

        let err = store.get(SECTION_COMMON, KEY_AES_KEY).unwrap_err();
        assert!(matches!(err, VaultError::ConfigFormat { .. }));
        assert!(err.is_storage_io());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, store) = test_store();
        for i in 0..5 {
            store.set(SECTION_COMMON, KEY_CLOUD_TOKEN, &format!("t{i}")).unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(store.data_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from(CONFIG_FILENAME)]);
    }

    #[test]
    fn initialize_vault_default_location() {
        let (_dir, store) = test_store();
        let path = store.initialize_vault(None).unwrap();

        assert_eq!(path, store.default_database_file());
        assert!(path.is_file());
        assert_eq!(store.database_file().unwrap(), path);
    }

    #[test]
    fn initialize_vault_custom_directory_is_idempotent() {
        let (dir, store) = test_store();
        let target = dir.path().join("elsewhere");

        let first = store.initialize_vault(Some(&target)).unwrap();
        let second = store.initialize_vault(Some(&target)).unwrap();

        assert_eq!(first, target.join(DB_FILENAME));
        assert_eq!(first, second);
        assert!(first.is_file());
    }

    #[test]
    fn remote_credentials_roundtrip() {
        let (_dir, store) = test_store();
        assert!(matches!(
            store.remote_credentials(),
            Err(VaultError::MissingConfig { .. })
        ));

        store
            .set_remote_credentials("https://backup.example.com/vault", "t0ken")
            .unwrap();
        let creds = store.remote_credentials().unwrap();
        assert_eq!(creds.api_url, "https://backup.example.com/vault");
        assert_eq!(creds.token, "t0ken");
    }

    #[test]
    fn remote_credentials_replace_together_and_keep_key() {
        let (_dir, store) = test_store();
        store.set(SECTION_COMMON, KEY_AES_KEY, "k").unwrap();
        store
            .set_remote_credentials("https://old.example.com", "old")
            .unwrap();
        store
            .set_remote_credentials("https://new.example.com/api", "new")
            .unwrap();

        let doc = store.load().unwrap();
        let common = &doc[SECTION_COMMON];
        assert_eq!(common[KEY_CLOUD_API], "https://new.example.com/api");
        assert_eq!(common[KEY_CLOUD_TOKEN], "new");
        assert_eq!(common[KEY_AES_KEY], "k");
    }

    #[test]
    fn remote_credentials_are_validated() {
        let (_dir, store) = test_store();

        assert!(matches!(
            store.set_remote_credentials("not a url", "tok"),
            Err(VaultError::InvalidUrl { .. })
        ));
        assert!(matches!(
            store.set_remote_credentials("ftp://example.com", "tok"),
            Err(VaultError::InvalidUrl { .. })
        ));
        assert!(matches!(
            store.set_remote_credentials("https://example.com", "  "),
            Err(VaultError::InvalidArgument(_))
        ));
        assert!(store.get_optional(SECTION_COMMON, KEY_CLOUD_API).unwrap().is_none());
    }

    #[test]
    fn http_url_parsing() {
        assert!(parse_http_url("http://localhost:8080/upload").is_ok());
        assert!(parse_http_url("https://example.com").is_ok());
        assert!(parse_http_url("example.com").is_err());
        assert!(parse_http_url("mailto:someone@example.com").is_err());
    }
}
