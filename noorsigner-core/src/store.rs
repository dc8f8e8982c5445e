// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-account on-disk storage.
//!
//! Layout under the storage root (default `~/.noorsigner`):
//!
//! ```text
//! <root>/
//!   accounts/
//!     npub1…/
//!       keys.encrypted     hex(salt) ":" hex(nonce) ":" hex(ciphertext)
//!       trust_session      hex(token) ":" expires ":" created ":" hex(ct)
//!   active_account         bare npub
//! ```
//!
//! Secret-bearing files are written `0600`, directories `0700`. The `npub`
//! directory name is the canonical account identifier.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, info, trace, warn};
use zeroize::Zeroizing;

use crate::crypto::{self, EncryptedKey, KdfParams, TrustSession};
use crate::error::{Result, SignerError};
use crate::keys::{self, NostrKeypair};

const ACCOUNTS_DIR: &str = "accounts";
const KEY_FILE: &str = "keys.encrypted";
const TRUST_SESSION_FILE: &str = "trust_session";
const ACTIVE_ACCOUNT_FILE: &str = "active_account";

/// Opaque source of passwords, implemented by the terminal prompt.
pub trait PasswordPrompt {
    /// Read a password without echoing it.
    fn read(&self, prompt: &str) -> Result<Zeroizing<String>>;
}

/// Metadata about a stored account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub npub: String,
    pub pubkey: String,
    pub created_at: i64,
}

/// The multi-account store rooted at a storage directory.
pub struct AccountStore {
    root: PathBuf,
    kdf: KdfParams,
}

impl AccountStore {
    /// Open (creating if needed) the store at `root`.
    pub fn open(root: PathBuf) -> Result<Self> {
        let store = Self {
            root,
            kdf: KdfParams::DEFAULT,
        };
        create_private_dir(&store.root)?;
        create_private_dir(&store.accounts_dir())?;
        Ok(store)
    }

    /// Override the KDF cost parameters. Used by tests.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The KDF parameters this store encrypts and decrypts with.
    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }

    fn accounts_dir(&self) -> PathBuf {
        self.root.join(ACCOUNTS_DIR)
    }

    fn account_dir(&self, npub: &str) -> PathBuf {
        self.accounts_dir().join(npub)
    }

    fn key_file(&self, npub: &str) -> PathBuf {
        self.account_dir(npub).join(KEY_FILE)
    }

    fn trust_file(&self, npub: &str) -> PathBuf {
        self.account_dir(npub).join(TRUST_SESSION_FILE)
    }

    fn active_file(&self) -> PathBuf {
        self.root.join(ACTIVE_ACCOUNT_FILE)
    }

    /// Returns true if an account directory with a key file exists.
    pub fn exists(&self, npub: &str) -> bool {
        self.key_file(npub).is_file()
    }

    /// Write an encrypted key under `accounts/<npub>/keys.encrypted`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::AccountExists`] if the key file is already
    /// present and `overwrite` is false.
    pub fn save_encrypted(
        &self,
        npub: &str,
        encrypted: &EncryptedKey,
        overwrite: bool,
    ) -> Result<()> {
        debug!(npub, "saving encrypted key");
        if !overwrite && self.exists(npub) {
            return Err(SignerError::AccountExists(npub.to_string()));
        }
        create_private_dir(&self.account_dir(npub))?;
        write_secret_file(&self.key_file(npub), encrypted.encode().as_bytes())
    }

    /// Load the encrypted key for an account.
    pub fn load_encrypted(&self, npub: &str) -> Result<EncryptedKey> {
        trace!(npub, "loading encrypted key");
        let path = self.key_file(npub);
        if !path.is_file() {
            return Err(SignerError::AccountNotFound(npub.to_string()));
        }
        EncryptedKey::parse(&fs::read_to_string(path)?)
    }

    /// Write the trust session for an account.
    pub fn save_trust(&self, npub: &str, session: &TrustSession) -> Result<()> {
        debug!(npub, expires_at = session.expires_at, "saving trust session");
        create_private_dir(&self.account_dir(npub))?;
        write_secret_file(&self.trust_file(npub), session.encode().as_bytes())
    }

    /// Load the trust session for an account, `None` when absent.
    pub fn load_trust(&self, npub: &str) -> Result<Option<TrustSession>> {
        let path = self.trust_file(npub);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(TrustSession::parse(&fs::read_to_string(path)?)?))
    }

    /// Delete the trust session for an account. Missing file is success.
    pub fn clear_trust(&self, npub: &str) -> Result<()> {
        match fs::remove_file(self.trust_file(npub)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load the trust session if it is present, parseable, and unexpired.
    /// Corrupt or expired sessions are deleted.
    pub fn valid_trust(&self, npub: &str, now: i64) -> Result<Option<TrustSession>> {
        match self.load_trust(npub) {
            Ok(Some(session)) if session.is_valid(now) => Ok(Some(session)),
            Ok(Some(_)) => {
                debug!(npub, "trust session expired");
                self.clear_trust(npub)?;
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(SignerError::CorruptTrustSession(reason)) => {
                warn!(npub, %reason, "discarding corrupt trust session");
                self.clear_trust(npub)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Mark an account active.
    pub fn set_active(&self, npub: &str) -> Result<()> {
        debug!(npub, "setting active account");
        write_secret_file(&self.active_file(), npub.as_bytes())
    }

    /// The active account npub.
    pub fn get_active(&self) -> Result<String> {
        let path = self.active_file();
        if !path.is_file() {
            return Err(SignerError::NoActiveAccount);
        }
        Ok(fs::read_to_string(path)?.trim().to_string())
    }

    /// Remove the active-account pointer if present.
    pub fn clear_active(&self) -> Result<()> {
        match fs::remove_file(self.active_file()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All stored accounts, sorted by npub ascending.
    pub fn list(&self) -> Result<Vec<AccountInfo>> {
        let mut accounts = Vec::new();

        let entries = match fs::read_dir(self.accounts_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(accounts),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(npub) = name.to_str() else { continue };
            if !npub.starts_with("npub1") || !entry.path().is_dir() {
                continue;
            }
            if !self.exists(npub) {
                continue;
            }

            let Ok(pubkey) = keys::npub_to_pubkey_hex(npub) else {
                warn!(npub, "skipping account with undecodable npub");
                continue;
            };

            let created_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            accounts.push(AccountInfo {
                npub: npub.to_string(),
                pubkey,
                created_at,
            });
        }

        accounts.sort_by(|a, b| a.npub.cmp(&b.npub));
        Ok(accounts)
    }

    /// Remove an account and all of its data. Clears the active pointer if
    /// it referenced the removed account.
    pub fn remove(&self, npub: &str) -> Result<()> {
        let dir = self.account_dir(npub);
        if !dir.is_dir() {
            return Err(SignerError::AccountNotFound(npub.to_string()));
        }

        info!(npub, "removing account");
        fs::remove_dir_all(&dir)?;

        if self.get_active().is_ok_and(|active| active == npub) {
            self.clear_active()?;
        }

        Ok(())
    }

    /// Validate and encrypt a new account.
    ///
    /// The nsec may be bech32 or hex; the canonical bech32 form is what gets
    /// encrypted. Does not touch the active pointer.
    pub fn add_account(&self, nsec: &str, password: &str) -> Result<AccountInfo> {
        if password.chars().count() < 8 {
            return Err(SignerError::WeakPassword);
        }

        let keypair = NostrKeypair::from_nsec(nsec)?;
        let npub = keypair.to_npub();
        if self.exists(&npub) {
            return Err(SignerError::AccountExists(npub));
        }

        let canonical = keypair.to_nsec();
        let encrypted = crypto::encrypt_nsec(&canonical, password.as_bytes(), self.kdf)?;
        self.save_encrypted(&npub, &encrypted, false)?;

        info!(npub, "account added");
        Ok(AccountInfo {
            pubkey: keypair.public_hex(),
            npub,
            created_at: crypto::unix_now(),
        })
    }

    /// Decrypt an account's key with the supplied password and return the
    /// nsec.
    ///
    /// # Errors
    ///
    /// [`SignerError::InvalidPassword`] when decryption fails;
    /// [`SignerError::CorruptKeyFile`] when the file parses but the decrypted
    /// contents are not the key the directory name claims.
    pub fn verify_password(&self, npub: &str, password: &str) -> Result<Zeroizing<String>> {
        let encrypted = self.load_encrypted(npub)?;
        let nsec = crypto::decrypt_nsec(&encrypted, password.as_bytes(), self.kdf)?;

        let keypair = NostrKeypair::from_nsec(&nsec)
            .map_err(|_| SignerError::CorruptKeyFile("decrypted key is not a valid nsec".into()))?;
        if keypair.to_npub() != npub {
            return Err(SignerError::CorruptKeyFile(
                "decrypted key does not match account".into(),
            ));
        }

        Ok(nsec)
    }

    /// One-shot migration from the legacy single-account layout
    /// (`<root>/keys.encrypted` + `<root>/trust_session`).
    ///
    /// Prompts for the password once, re-homes the key under its account
    /// directory, carries the trust session along, and sets the account
    /// active. If accounts already exist the stale legacy files are removed
    /// without prompting. On failure the legacy files are left intact.
    pub fn migrate_legacy(&self, prompt: &dyn PasswordPrompt) -> Result<Option<String>> {
        let legacy_key = self.root.join(KEY_FILE);
        let legacy_trust = self.root.join(TRUST_SESSION_FILE);

        if !legacy_key.is_file() {
            return Ok(None);
        }

        if !self.list()?.is_empty() {
            debug!("accounts already present, discarding legacy files");
            let _ = fs::remove_file(&legacy_key);
            let _ = fs::remove_file(&legacy_trust);
            return Ok(None);
        }

        info!("migrating legacy single-account layout");
        let encrypted = EncryptedKey::parse(&fs::read_to_string(&legacy_key)?)?;

        let password = prompt.read("Enter password to migrate existing key: ")?;
        let nsec = crypto::decrypt_nsec(&encrypted, password.as_bytes(), self.kdf)?;
        let keypair = NostrKeypair::from_nsec(&nsec)?;
        let npub = keypair.to_npub();

        self.save_encrypted(&npub, &encrypted, false)?;

        if legacy_trust.is_file() {
            let migrated = fs::read_to_string(&legacy_trust)
                .map_err(SignerError::from)
                .and_then(|content| TrustSession::parse(&content))
                .and_then(|session| self.save_trust(&npub, &session));
            if let Err(e) = migrated {
                warn!(error = %e, "legacy trust session not migrated");
            }
        }

        self.set_active(&npub)?;

        fs::remove_file(&legacy_key)?;
        let _ = fs::remove_file(&legacy_trust);

        info!(npub, "migrated account");
        Ok(Some(npub))
    }
}

fn create_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn write_secret_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(content)?;

    // mode() only applies on create; clamp pre-existing files too
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
