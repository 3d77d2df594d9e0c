//! Durable device-trust token storage.
//!
//! A trust token is the one secret that outlives a session: presenting it
//! at sign-in lets the service skip the second factor on a device it has
//! seen before. Tokens are stored one file per account, named
//! deterministically from the lowercased account name, so every login for
//! the same account finds the same record.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};

/// What gets written to disk for one trusted device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustRecord {
    trust_token: String,
    saved_at: DateTime<Utc>,
}

/// File-backed trust-token store, one record per account.
#[derive(Debug)]
pub struct TrustStore {
    dir: PathBuf,
}

impl TrustStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Loads the saved trust token for an account.
    ///
    /// A missing record means the device was never trusted; that is
    /// `Ok(None)`, not an error.
    pub fn load(&self, account: &str) -> ClientResult<Option<String>> {
        let path = self.record_path(account);
        if !path.exists() {
            debug!(account = %account, "no trust record");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            ClientError::storage(format!("failed to read trust record: {e}")).with_account(account)
        })?;
        let record: TrustRecord = serde_json::from_str(&content).map_err(|e| {
            ClientError::storage(format!("failed to parse trust record: {e}")).with_account(account)
        })?;

        debug!(account = %account, saved_at = %record.saved_at, "loaded trust token");
        Ok(Some(record.trust_token))
    }

    /// Saves a trust token for an account, replacing any previous one.
    pub fn save(&self, account: &str, trust_token: &str) -> ClientResult<()> {
        let path = self.record_path(account);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ClientError::storage(format!("failed to create trust directory: {e}"))
                    .with_account(account)
            })?;
        }

        let record = TrustRecord {
            trust_token: trust_token.to_string(),
            saved_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| ClientError::internal(format!("failed to serialize trust record: {e}")))?;

        // Write to temp file first, then rename for atomicity.
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| {
            ClientError::storage(format!("failed to write trust record: {e}")).with_account(account)
        })?;
        fs::rename(&temp_path, &path).map_err(|e| {
            ClientError::storage(format!("failed to rename trust record: {e}"))
                .with_account(account)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&path, perms);
        }

        info!(account = %account, "saved trust token");
        Ok(())
    }

    /// Removes the stored trust token for an account, if any.
    pub fn clear(&self, account: &str) -> ClientResult<()> {
        let path = self.record_path(account);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                ClientError::storage(format!("failed to remove trust record: {e}"))
                    .with_account(account)
            })?;
            info!(account = %account, "cleared trust token");
        }
        Ok(())
    }

    /// Where an account's record lives. Derived from the lowercased account
    /// name so lookups are deterministic across sessions.
    pub fn record_path(&self, account: &str) -> PathBuf {
        let slug: String = account
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '@' | '.' | '-' | '_' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("trust-{slug}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
