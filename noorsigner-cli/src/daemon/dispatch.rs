// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The IPC method table.
//!
//! Every handler turns its errors into `{id, error}`; only the transport
//! can kill a connection. Signing-style methods answer in the `signature`
//! field, account methods in the structured fields.

use tracing::{debug, info};

use noorsigner_core::crypto::{self, TrustSession};
use noorsigner_core::error::{Result, SignerError};
use noorsigner_core::keys::{self, NostrKeypair};
use noorsigner_core::{event, nip04, nip44};

use crate::autostart;
use crate::daemon::{ActiveIdentity, Daemon};
use crate::ipc::{Reply, Request, MAX_REQUEST_SIZE};

fn locked(id: String) -> Reply {
    Reply::error(id, "daemon is locked - no active key loaded")
}

impl Daemon {
    pub(crate) async fn dispatch(&self, request: Request) -> Reply {
        let id = request.id.clone();
        debug!(method = %request.method, id = %id, "request");

        match request.method.as_str() {
            "get_npub" => self.get_npub(id).await,
            "sign_event" => self.sign_event(id, request.event_json).await,
            "nip44_encrypt" => {
                self.nip44_encrypt(id, request.plaintext, request.recipient_pubkey)
                    .await
            }
            "nip44_decrypt" => {
                self.nip44_decrypt(id, request.payload, request.sender_pubkey)
                    .await
            }
            "nip04_encrypt" => {
                self.nip04_encrypt(id, request.plaintext, request.recipient_pubkey)
                    .await
            }
            "nip04_decrypt" => {
                self.nip04_decrypt(id, request.payload, request.sender_pubkey)
                    .await
            }
            "list_accounts" => self.list_accounts(id).await,
            "add_account" => self.add_account(id, request).await,
            "switch_account" => self.switch_account(id, request).await,
            "remove_account" => self.remove_account(id, request).await,
            "get_active_account" => self.get_active_account(id).await,
            "shutdown_daemon" => Reply::signature(id, "success"),
            "enable_autostart" => match autostart::enable() {
                Ok(()) => Reply::signature(id, "success"),
                Err(e) => Reply::error(id, e.to_string()),
            },
            "disable_autostart" => match autostart::disable() {
                Ok(()) => Reply::signature(id, "success"),
                Err(e) => Reply::error(id, e.to_string()),
            },
            "get_autostart_status" => match autostart::status() {
                Ok(true) => Reply::signature(id, "enabled"),
                Ok(false) => Reply::signature(id, "disabled"),
                Err(e) => Reply::error(id, e.to_string()),
            },
            unknown => Reply::error(id, format!("Unknown method: {unknown}")),
        }
    }

    async fn get_npub(&self, id: String) -> Reply {
        let guard = self.identity.read().await;
        match guard.as_ref() {
            Some(identity) => Reply::signature(id, identity.npub.clone()),
            None => locked(id),
        }
    }

    async fn sign_event(&self, id: String, event_json: Option<String>) -> Reply {
        let Some(event_json) = event_json else {
            return Reply::error(id, SignerError::MissingField("event_json").to_string());
        };
        if event_json.len() > MAX_REQUEST_SIZE {
            return Reply::error(id, "Event JSON too large");
        }

        let guard = self.identity.read().await;
        let Some(identity) = guard.as_ref() else {
            return locked(id);
        };

        // the event's pubkey field is the caller's responsibility and is
        // hashed verbatim, even when it differs from the signing key
        let result =
            event::event_hash(&event_json).and_then(|hash| identity.keypair.sign(&hash));

        match result {
            Ok(signature) => Reply::signature(id, hex::encode(signature)),
            Err(e) => Reply::error(id, e.to_string()),
        }
    }

    async fn nip44_encrypt(
        &self,
        id: String,
        plaintext: Option<String>,
        recipient_pubkey: Option<String>,
    ) -> Reply {
        let (Some(plaintext), Some(recipient)) = (plaintext, recipient_pubkey) else {
            return Reply::error(
                id,
                SignerError::MissingField("plaintext and recipient_pubkey").to_string(),
            );
        };
        let peer = match keys::parse_x_only_pubkey(&recipient) {
            Ok(peer) => peer,
            Err(e) => return Reply::error(id, e.to_string()),
        };

        let guard = self.identity.read().await;
        let Some(identity) = guard.as_ref() else {
            return locked(id);
        };

        let result = identity
            .keypair
            .shared_secret_x(&peer)
            .map(|shared| nip44::conversation_key(&shared))
            .and_then(|key| nip44::encrypt(&plaintext, &key));

        match result {
            Ok(payload) => Reply::signature(id, payload),
            Err(e) => Reply::error(id, e.to_string()),
        }
    }

    async fn nip44_decrypt(
        &self,
        id: String,
        payload: Option<String>,
        sender_pubkey: Option<String>,
    ) -> Reply {
        let (Some(payload), Some(sender)) = (payload, sender_pubkey) else {
            return Reply::error(
                id,
                SignerError::MissingField("payload and sender_pubkey").to_string(),
            );
        };
        let peer = match keys::parse_x_only_pubkey(&sender) {
            Ok(peer) => peer,
            Err(e) => return Reply::error(id, e.to_string()),
        };

        let guard = self.identity.read().await;
        let Some(identity) = guard.as_ref() else {
            return locked(id);
        };

        let result = identity
            .keypair
            .shared_secret_x(&peer)
            .map(|shared| nip44::conversation_key(&shared))
            .and_then(|key| nip44::decrypt(&payload, &key));

        match result {
            Ok(plaintext) => Reply::signature(id, plaintext.to_string()),
            Err(e) => Reply::error(id, e.to_string()),
        }
    }

    async fn nip04_encrypt(
        &self,
        id: String,
        plaintext: Option<String>,
        recipient_pubkey: Option<String>,
    ) -> Reply {
        let (Some(plaintext), Some(recipient)) = (plaintext, recipient_pubkey) else {
            return Reply::error(
                id,
                SignerError::MissingField("plaintext and recipient_pubkey").to_string(),
            );
        };
        let peer = match keys::parse_x_only_pubkey(&recipient) {
            Ok(peer) => peer,
            Err(e) => return Reply::error(id, e.to_string()),
        };

        let guard = self.identity.read().await;
        let Some(identity) = guard.as_ref() else {
            return locked(id);
        };

        let result = identity
            .keypair
            .shared_secret_x(&peer)
            .and_then(|shared| nip04::encrypt(&plaintext, &shared));

        match result {
            Ok(payload) => Reply::signature(id, payload),
            Err(e) => Reply::error(id, e.to_string()),
        }
    }

    async fn nip04_decrypt(
        &self,
        id: String,
        payload: Option<String>,
        sender_pubkey: Option<String>,
    ) -> Reply {
        let (Some(payload), Some(sender)) = (payload, sender_pubkey) else {
            return Reply::error(
                id,
                SignerError::MissingField("payload and sender_pubkey").to_string(),
            );
        };
        let peer = match keys::parse_x_only_pubkey(&sender) {
            Ok(peer) => peer,
            Err(e) => return Reply::error(id, e.to_string()),
        };

        let guard = self.identity.read().await;
        let Some(identity) = guard.as_ref() else {
            return locked(id);
        };

        let result = identity
            .keypair
            .shared_secret_x(&peer)
            .and_then(|shared| nip04::decrypt(&payload, &shared));

        match result {
            Ok(plaintext) => Reply::signature(id, plaintext.to_string()),
            Err(e) => Reply::error(id, e.to_string()),
        }
    }

    async fn list_accounts(&self, id: String) -> Reply {
        let guard = self.identity.read().await;
        let active_pubkey = guard.as_ref().map(|identity| identity.pubkey_hex.clone());

        match self.store.list() {
            Ok(accounts) => Reply::account_list(
                id,
                accounts.into_iter().map(Into::into).collect(),
                active_pubkey,
            ),
            Err(e) => Reply::error(id, e.to_string()),
        }
    }

    async fn add_account(&self, id: String, request: Request) -> Reply {
        let (Some(nsec), Some(password)) = (request.nsec, request.password) else {
            return Reply::error(
                id,
                SignerError::MissingField("nsec and password").to_string(),
            );
        };
        let set_active = request.set_active.unwrap_or(false);

        // disk only; the in-memory identity changes through switch_account
        let _guard = self.identity.read().await;

        let store = self.store.clone();
        // nsec and password zeroize themselves when the closure drops them
        let result = tokio::task::spawn_blocking(move || {
            store
                .add_account(nsec.as_str(), password.as_str())
                .and_then(|info| {
                    if set_active {
                        store.set_active(&info.npub)?;
                    }
                    Ok(info)
                })
        })
        .await;

        match result {
            Ok(Ok(info)) => {
                info!(npub = %info.npub, "account added via ipc");
                Reply::account(id, info.pubkey, info.npub)
            }
            Ok(Err(e)) => Reply::error(id, e.to_string()),
            Err(e) => Reply::error(id, format!("internal error: {e}")),
        }
    }

    /// npub wins when both identifiers are supplied; else the account set is
    /// scanned for a case-insensitive pubkey match.
    fn resolve_identifier(
        &self,
        npub: Option<String>,
        pubkey: Option<String>,
    ) -> Result<String> {
        if let Some(npub) = npub.filter(|n| !n.is_empty()) {
            if self.store.exists(&npub) {
                return Ok(npub);
            }
            return Err(SignerError::AccountNotFound(npub));
        }

        if let Some(pubkey) = pubkey.filter(|p| !p.is_empty()) {
            for account in self.store.list()? {
                if account.pubkey.eq_ignore_ascii_case(&pubkey) {
                    return Ok(account.npub);
                }
            }
            return Err(SignerError::AccountNotFound(pubkey));
        }

        Err(SignerError::MissingField("pubkey or npub"))
    }

    async fn switch_account(&self, id: String, request: Request) -> Reply {
        let Some(password) = request.password else {
            return Reply::error(id, SignerError::MissingField("password").to_string());
        };
        let npub = match self.resolve_identifier(request.npub, request.pubkey) {
            Ok(npub) => npub,
            Err(e) => return Reply::error(id, e.to_string()),
        };

        // scrypt runs before the exclusive lock is taken so signers are not
        // starved behind the KDF; a failed decryption changes nothing
        let store = self.store.clone();
        let target = npub.clone();
        let verified =
            tokio::task::spawn_blocking(move || store.verify_password(&target, password.as_str()))
                .await;

        let nsec = match verified {
            Ok(Ok(nsec)) => nsec,
            Ok(Err(e)) => return Reply::error(id, e.to_string()),
            Err(e) => return Reply::error(id, format!("internal error: {e}")),
        };

        let keypair = match NostrKeypair::from_nsec(&nsec) {
            Ok(keypair) => keypair,
            Err(_) => {
                return Reply::error(
                    id,
                    SignerError::CorruptKeyFile("decrypted key is not a valid nsec".into())
                        .to_string(),
                )
            }
        };
        let session = match TrustSession::create(&nsec, crypto::unix_now()) {
            Ok(session) => session,
            Err(e) => return Reply::error(id, e.to_string()),
        };
        drop(nsec);

        let mut guard = self.identity.write().await;

        // still before the old key is dropped, so failure leaves it live
        if let Err(e) = self.store.save_trust(&npub, &session) {
            return Reply::error(id, e.to_string());
        }

        *guard = None; // old key zeroized on drop
        let pubkey_hex = keypair.public_hex();
        *guard = Some(ActiveIdentity {
            npub: npub.clone(),
            pubkey_hex: pubkey_hex.clone(),
            keypair,
        });

        if let Err(e) = self.store.set_active(&npub) {
            // past the point of no return: fail into the locked state
            // rather than resurrect a half-torn-down identity
            *guard = None;
            return Reply::error(id, e.to_string());
        }

        info!(%npub, "account switched");
        Reply::account(id, pubkey_hex, npub)
    }

    async fn remove_account(&self, id: String, request: Request) -> Reply {
        let Some(password) = request.password else {
            return Reply::error(id, SignerError::MissingField("password").to_string());
        };
        let npub = match self.resolve_identifier(request.npub, request.pubkey) {
            Ok(npub) => npub,
            Err(e) => return Reply::error(id, e.to_string()),
        };

        let guard = self.identity.read().await;
        if guard
            .as_ref()
            .is_some_and(|identity| identity.npub == npub)
        {
            return Reply::error(id, SignerError::CannotRemoveActive.to_string());
        }

        let store = self.store.clone();
        let target = npub.clone();
        let verified = tokio::task::spawn_blocking(move || {
            store.verify_password(&target, password.as_str()).map(drop)
        })
        .await;

        match verified {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Reply::error(id, e.to_string()),
            Err(e) => return Reply::error(id, format!("internal error: {e}")),
        }

        match self.store.remove(&npub) {
            Ok(()) => {
                info!(%npub, "account removed via ipc");
                Reply::removed(id)
            }
            Err(e) => Reply::error(id, e.to_string()),
        }
    }

    async fn get_active_account(&self, id: String) -> Reply {
        let guard = self.identity.read().await;
        if let Some(identity) = guard.as_ref() {
            return Reply::active_status(
                id,
                Some(identity.pubkey_hex.clone()),
                Some(identity.npub.clone()),
                true,
            );
        }
        drop(guard);

        match self.store.get_active() {
            Ok(npub) => {
                let pubkey = keys::npub_to_pubkey_hex(&npub).ok();
                Reply::active_status(id, pubkey, Some(npub), false)
            }
            Err(_) => Reply::active_status(id, None, None, false),
        }
    }
}
