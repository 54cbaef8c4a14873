//! Vault error types.
//!
//! All subsystems surface errors through [`VaultError`], which is the single
//! error type returned by every public API in this crate. Each variant
//! carries enough context for callers to decide how to handle the failure
//! without inspecting opaque strings.
//!
//! "Not found" is deliberately absent: point lookups return `Option`, and
//! `update`/`delete` on an unknown id touch zero rows without failing.

/// Unified error type for the minipass credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Configuration ------------------------------------------------------
    /// A required configuration key is absent (uninitialised vault or
    /// missing remote credentials).
    #[error("missing configuration: [{section}] {key}")]
    MissingConfig { section: String, key: String },

    /// The configuration file exists but cannot be parsed or serialised.
    #[error("configuration file is malformed: {reason}")]
    ConfigFormat { reason: String },

    /// The user's home directory could not be determined.
    #[error("cannot determine the home directory")]
    HomeDirUnavailable,

    // -- Crypto -------------------------------------------------------------
    /// The stored master key is not a base64-encoded 256-bit key.
    #[error("invalid master key: {reason}")]
    InvalidMasterKey { reason: String },

    /// Encryption failed (e.g. RNG failure, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (wrong key, corrupted or truncated ciphertext).
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    // -- Records ------------------------------------------------------------
    /// A record with this name already exists.
    #[error("a record named {name:?} already exists")]
    DuplicateName { name: String },

    /// A caller-supplied value was rejected before touching storage.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A URL could not be parsed as an absolute http(s) URL.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    // -- Remote sync --------------------------------------------------------
    /// The remote endpoint answered with a non-200 status.
    #[error("remote returned status {status}: {body}")]
    Remote { status: u16, body: String },

    /// The request could not be sent or the response could not be read.
    #[error("remote transport error: {reason}")]
    Transport { reason: String },

    /// The remote endpoint did not answer within the configured timeout.
    #[error("remote request timed out after {timeout:?}")]
    Timeout { timeout: std::time::Duration },

    /// A restored payload is not a usable vault file.
    #[error("invalid vault file: {reason}")]
    InvalidVaultFile { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// SQLite error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    pub(crate) fn missing(section: &str, key: &str) -> Self {
        Self::MissingConfig {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    /// Whether this is a file or database I/O failure.
    pub fn is_storage_io(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Io(_) | Self::ConfigFormat { .. }
        )
    }

    /// Whether this failure came from talking to the remote endpoint.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::Transport { .. } | Self::Timeout { .. }
        )
    }
}

impl From<toml::de::Error> for VaultError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigFormat {
            reason: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for VaultError {
    fn from(err: toml::ser::Error) -> Self {
        Self::ConfigFormat {
            reason: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
