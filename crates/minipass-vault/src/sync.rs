//! Remote backup of the raw vault file.
//!
//! Both directions use a single `POST` to the configured `cloud_api` URL
//! with `Authorization: Bearer <cloud_token>`:
//!
//! - **upload** sends the vault bytes as `application/octet-stream`;
//! - **restore** sends no body and expects the vault bytes back.
//!
//! Status 200 is success; anything else is returned as
//! [`VaultError::Remote`] with the status and body. Requests are single-shot
//! with a bounded timeout and are never retried.
//!
//! A restored payload is written beside the live vault, checked to be a
//! SQLite database containing the `passwords` table, and only then renamed
//! over the vault. The master key never travels in either direction, so a
//! restored vault is only readable with the key that wrote it.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use rusqlite::{Connection, OpenFlags, params};

use crate::config::{ConfigStore, RemoteCredentials};
use crate::error::{Result, VaultError};
use crate::store::TABLE_NAME;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// First 16 bytes of every SQLite 3 database file.
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Status and body of a successful remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RemoteResponse {
    /// The body decoded as UTF-8, with invalid sequences replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Pushes and pulls the vault file to and from the remote endpoint.
pub struct SyncClient {
    credentials: RemoteCredentials,
    client: reqwest::Client,
    timeout: Duration,
}

impl SyncClient {
    /// Build a client from the remote credentials stored in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingConfig`] when `cloud_api` or
    /// `cloud_token` is not configured.
    pub fn from_config(config: &ConfigStore) -> Result<Self> {
        Self::new(config.remote_credentials()?)
    }

    /// Build a client for explicit credentials with [`DEFAULT_TIMEOUT`].
    pub fn new(credentials: RemoteCredentials) -> Result<Self> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            credentials,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    pub fn api_url(&self) -> &str {
        &self.credentials.api_url
    }

    /// Send the raw bytes of `vault_file` to the remote endpoint.
    ///
    /// Local state is never modified.
    pub async fn upload(&self, vault_file: &Path) -> Result<RemoteResponse> {
        let bytes = tokio::fs::read(vault_file).await?;
        let size = bytes.len();

        tracing::info!(api_url = %self.credentials.api_url, size, "uploading vault");

        let request = self
            .client
            .post(&self.credentials.api_url)
            .bearer_auth(&self.credentials.token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);

        let response = self.send(request).await?;
        tracing::info!(status = response.status, "vault uploaded");
        Ok(response)
    }

    /// Fetch the vault from the remote endpoint and replace `vault_file`
    /// with it once the payload has been validated.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidVaultFile`] when the payload is not a
    /// vault database; `vault_file` is left untouched in that case.
    pub async fn restore(&self, vault_file: &Path) -> Result<RemoteResponse> {
        tracing::info!(api_url = %self.credentials.api_url, "restoring vault");

        let request = self
            .client
            .post(&self.credentials.api_url)
            .bearer_auth(&self.credentials.token);
        let response = self.send(request).await?;

        let target = vault_file.to_path_buf();
        let response = tokio::task::spawn_blocking(move || {
            replace_vault_file(&target, &response.body).map(|()| response)
        })
        .await
        .map_err(|e| VaultError::Io(std::io::Error::other(e)))??;

        tracing::info!(
            path = %vault_file.display(),
            size = response.body.len(),
            "vault restored"
        );
        Ok(response)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<RemoteResponse> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?
            .to_vec();

        if status != 200 {
            let body = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(status, "remote rejected request");
            return Err(VaultError::Remote { status, body });
        }

        Ok(RemoteResponse { status, body })
    }

    fn transport_error(&self, err: reqwest::Error) -> VaultError {
        if err.is_timeout() {
            VaultError::Timeout {
                timeout: self.timeout,
            }
        } else {
            VaultError::Transport {
                reason: err.to_string(),
            }
        }
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(format!("minipass/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| VaultError::Transport {
            reason: format!("failed to build HTTP client: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Restore validation
// ---------------------------------------------------------------------------

/// Check that `path` is a readable SQLite database holding the record table.
pub fn validate_vault_file(path: &Path) -> Result<()> {
    let invalid = |reason: String| VaultError::InvalidVaultFile { reason };

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| invalid(e.to_string()))?;

    let integrity: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|e| invalid(e.to_string()))?;
    if integrity != "ok" {
        return Err(invalid(format!("integrity check failed: {integrity}")));
    }

    let tables: i64 = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![TABLE_NAME],
            |row| row.get(0),
        )
        .map_err(|e| invalid(e.to_string()))?;
    if tables == 0 {
        return Err(invalid(format!("no {TABLE_NAME} table")));
    }

    Ok(())
}

/// Stage `payload` beside `target`, validate it, then rename it into place.
fn replace_vault_file(target: &Path, payload: &[u8]) -> Result<()> {
    if !payload.starts_with(SQLITE_MAGIC) {
        return Err(VaultError::InvalidVaultFile {
            reason: "payload is not a SQLite database".into(),
        });
    }

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(payload)?;
    staged.as_file().sync_all()?;

    validate_vault_file(staged.path())?;

    staged.persist(target).map_err(|e| VaultError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Vault;
    use tempfile::TempDir;

    #[test]
    fn rejects_payload_without_sqlite_header() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("vault.db");
        std::fs::write(&target, b"current").unwrap();

        let err = replace_vault_file(&target, b"<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, VaultError::InvalidVaultFile { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"current");
    }

    #[test]
    fn rejects_database_without_record_table() {
        let dir = TempDir::new().unwrap();
        let other = dir.path().join("other.db");
        Connection::open(&other)
            .unwrap()
            .execute_batch("CREATE TABLE notes (body TEXT);")
            .unwrap();

        let target = dir.path().join("vault.db");
        std::fs::write(&target, b"current").unwrap();

        let err = replace_vault_file(&target, &std::fs::read(&other).unwrap()).unwrap_err();
        assert!(matches!(err, VaultError::InvalidVaultFile { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"current");
    }

    #[test]
    fn replaces_with_valid_vault() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.db");
        Vault::create_database(&source).unwrap();
        let payload = std::fs::read(&source).unwrap();

        let target = dir.path().join("vault.db");
        std::fs::write(&target, b"current").unwrap();

        replace_vault_file(&target, &payload).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), payload);
    }

    #[test]
    fn body_text_is_lossy() {
        let response = RemoteResponse {
            status: 200,
            body: vec![b'o', b'k', 0xff],
        };
        assert!(response.body_text().starts_with("ok"));
    }
}
