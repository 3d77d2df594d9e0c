//! Encrypted credential vault.
//!
//! Stores the account name and password under a locally generated 256-bit
//! key so a later run can re-authenticate without prompting. The on-disk
//! record format is two newline-separated JSON blobs, one per value, each
//! `{"encryptedData": "<hex>"}` where the hex is a fresh 128-bit nonce
//! followed by the ciphertext. The cipher is authenticated: decrypting with
//! a key other than the one that wrote the record fails instead of
//! returning garbage.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};

/// AES-256-GCM with the record format's 128-bit nonce.
type VaultCipher = AesGcm<Aes256, U16>;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 16;

/// A username/password pair. Debug output never shows the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// One encrypted value as it appears on disk.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultRecord {
    encrypted_data: String,
}

/// File-backed credential vault: a key file plus a record file, both
/// owner-only.
#[derive(Debug)]
pub struct CredentialVault {
    dir: PathBuf,
}

impl CredentialVault {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Encrypts and persists credentials, minting the key on first use.
    pub fn store(&self, credentials: &Credentials) -> ClientResult<()> {
        let key = self.load_or_create_key()?;
        let cipher = VaultCipher::new_from_slice(&key)
            .map_err(|_| ClientError::internal("vault key has wrong length"))?;

        let username = encrypt_record(&cipher, credentials.username.as_bytes())?;
        let password = encrypt_record(&cipher, credentials.password.as_bytes())?;
        let content = format!(
            "{}\n{}\n",
            serde_json::to_string(&username)
                .map_err(|e| ClientError::internal(format!("failed to encode record: {e}")))?,
            serde_json::to_string(&password)
                .map_err(|e| ClientError::internal(format!("failed to encode record: {e}")))?,
        );

        write_private(&self.records_path(), content.as_bytes())?;
        info!("stored credentials in vault");
        Ok(())
    }

    /// Decrypts the stored credentials.
    ///
    /// `Ok(None)` when nothing was ever stored. A record that fails to
    /// decrypt (wrong key, corruption) is a storage error, never silently
    /// empty.
    pub fn load(&self) -> ClientResult<Option<Credentials>> {
        let records_path = self.records_path();
        if !records_path.exists() || !self.key_path().exists() {
            debug!("vault is empty");
            return Ok(None);
        }

        let key = self.load_key()?;
        let cipher = VaultCipher::new_from_slice(&key)
            .map_err(|_| ClientError::storage("vault key file has wrong length"))?;

        let content = fs::read_to_string(&records_path)
            .map_err(|e| ClientError::storage(format!("failed to read vault records: {e}")))?;
        let mut lines = content.lines().filter(|line| !line.trim().is_empty());
        let (first, second) = match (lines.next(), lines.next()) {
            (Some(first), Some(second)) => (first, second),
            _ => return Err(ClientError::storage("vault records file is truncated")),
        };

        let username = decrypt_record(&cipher, first)?;
        let password = decrypt_record(&cipher, second)?;
        Ok(Some(Credentials {
            username: String::from_utf8(username)
                .map_err(|_| ClientError::storage("vault record is not valid text"))?,
            password: String::from_utf8(password)
                .map_err(|_| ClientError::storage("vault record is not valid text"))?,
        }))
    }

    /// Removes the stored records. The key stays so other records keyed to
    /// it remain readable.
    pub fn clear(&self) -> ClientResult<()> {
        let path = self.records_path();
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| ClientError::storage(format!("failed to remove vault records: {e}")))?;
            info!("cleared vault records");
        }
        Ok(())
    }

    pub fn records_path(&self) -> PathBuf {
        self.dir.join("credentials.enc")
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join("vault.key")
    }

    fn load_or_create_key(&self) -> ClientResult<Vec<u8>> {
        if self.key_path().exists() {
            return self.load_key();
        }
        let key = VaultCipher::generate_key(&mut OsRng);
        write_private(&self.key_path(), hex::encode(key.as_slice()).as_bytes())?;
        info!("generated new vault key");
        Ok(key.as_slice().to_vec())
    }

    fn load_key(&self) -> ClientResult<Vec<u8>> {
        let content = fs::read_to_string(self.key_path())
            .map_err(|e| ClientError::storage(format!("failed to read vault key: {e}")))?;
        let key = hex::decode(content.trim())
            .map_err(|_| ClientError::storage("vault key file is not valid hex"))?;
        if key.len() != KEY_LEN {
            return Err(ClientError::storage("vault key file has wrong length"));
        }
        Ok(key)
    }
}

fn encrypt_record(cipher: &VaultCipher, plaintext: &[u8]) -> ClientResult<VaultRecord> {
    let nonce = VaultCipher::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| ClientError::internal("encryption failed"))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&ciphertext);
    Ok(VaultRecord {
        encrypted_data: hex::encode(blob),
    })
}

fn decrypt_record(cipher: &VaultCipher, line: &str) -> ClientResult<Vec<u8>> {
    let record: VaultRecord = serde_json::from_str(line)
        .map_err(|e| ClientError::storage(format!("malformed vault record: {e}")))?;
    let blob = hex::decode(&record.encrypted_data)
        .map_err(|_| ClientError::storage("vault record is not valid hex"))?;
    if blob.len() <= NONCE_LEN {
        return Err(ClientError::storage("vault record is too short"));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::<U16>::from_slice(nonce), ciphertext)
        .map_err(|_| ClientError::storage("credential decryption failed: wrong key or corrupt record"))
}

/// Writes a file atomically and restricts it to the owner.
fn write_private(path: &Path, content: &[u8]) -> ClientResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ClientError::storage(format!("failed to create vault directory: {e}")))?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)
        .map_err(|e| ClientError::storage(format!("failed to write vault file: {e}")))?;
    fs::rename(&temp_path, path)
        .map_err(|e| ClientError::storage(format!("failed to rename vault file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        let _ = fs::set_permissions(path, perms);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path());

        let creds = Credentials::new("user@example.com", "hunter2");
        vault.store(&creds).unwrap();

        let loaded = vault.load().unwrap().unwrap();
        assert_eq!(loaded, creds);
    }

    #[test]
    fn empty_vault_loads_none() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path());
        assert!(vault.load().unwrap().is_none());
    }

    #[test]
    fn wrong_key_fails_closed() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path());
        vault
            .store(&Credentials::new("user@example.com", "hunter2"))
            .unwrap();

        // Replace the key; the records must refuse to decrypt.
        let other_key = VaultCipher::generate_key(&mut OsRng);
        fs::write(vault.key_path(), hex::encode(other_key.as_slice())).unwrap();

        let err = vault.load().unwrap_err();
        assert_eq!(err.code(), crate::error::ClientErrorCode::Storage);
    }

    #[test]
    fn records_are_two_hex_blobs() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path());
        vault
            .store(&Credentials::new("user@example.com", "hunter2"))
            .unwrap();

        let content = fs::read_to_string(vault.records_path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let mut nonces = Vec::new();
        for line in lines {
            let record: VaultRecord = serde_json::from_str(line).unwrap();
            let blob = hex::decode(&record.encrypted_data).unwrap();
            assert!(blob.len() > NONCE_LEN);
            nonces.push(blob[..NONCE_LEN].to_vec());
        }
        // Each record carries its own nonce.
        assert_ne!(nonces[0], nonces[1]);
    }

    #[test]
    fn corrupt_record_is_storage_error() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path());
        vault.store(&Credentials::new("u", "p")).unwrap();

        fs::write(vault.records_path(), "{\"encryptedData\": \"zz\"}\n{}\n").unwrap();
        assert!(vault.load().is_err());
    }

    #[test]
    fn clear_removes_records_but_keeps_key() {
        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path());
        vault.store(&Credentials::new("u", "p")).unwrap();

        vault.clear().unwrap();
        assert!(vault.load().unwrap().is_none());
        assert!(vault.key_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn vault_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let vault = CredentialVault::new(dir.path());
        vault.store(&Credentials::new("u", "p")).unwrap();

        for path in [vault.key_path(), vault.records_path()] {
            let meta = fs::metadata(path).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::new("user@example.com", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("user@example.com"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
