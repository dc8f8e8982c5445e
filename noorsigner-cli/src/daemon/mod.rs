// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The signing daemon: startup sequence, accept loop, and shutdown.
//!
//! Startup resolves the active account, rehydrates from a trust session or
//! prompts for the password, then detaches into a background child (signalled
//! by the `NOORSIGNER_FORKED` marker) which binds the IPC endpoint and
//! serves until a signal or a `shutdown_daemon` request arrives.

mod dispatch;

use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use noorsigner_core::crypto::{self, TrustSession};
use noorsigner_core::error::{Result, SignerError};
use noorsigner_core::keys::NostrKeypair;
use noorsigner_core::store::AccountStore;

use crate::commands;
use crate::detach;
use crate::ipc::{Reply, Request, MAX_REQUEST_SIZE};
use crate::output::Output;
use crate::transport::Endpoint;

/// The identity currently loaded for signing.
pub struct ActiveIdentity {
    pub npub: String,
    pub pubkey_hex: String,
    pub keypair: NostrKeypair,
}

impl ActiveIdentity {
    pub fn from_keypair(npub: String, keypair: NostrKeypair) -> Self {
        Self {
            pubkey_hex: keypair.public_hex(),
            npub,
            keypair,
        }
    }
}

/// Shared daemon state.
///
/// One readers/writer lock guards the whole identity triple: signing and
/// encryption methods take it shared and hold it across the cryptographic
/// operation, so a concurrent switch can never zero the key mid-signature.
/// `switch_account` takes it exclusive. `None` is the locked state.
pub struct Daemon {
    store: Arc<AccountStore>,
    identity: RwLock<Option<ActiveIdentity>>,
    shutdown: watch::Sender<bool>,
}

impl Daemon {
    pub fn new(store: Arc<AccountStore>, identity: Option<ActiveIdentity>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            store,
            identity: RwLock::new(identity),
            shutdown,
        })
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn clear_identity(&self) {
        // the keypair zeroizes its secret on drop
        *self.identity.write().await = None;
    }

    /// Service one connection: read a single newline- or EOS-framed JSON
    /// request, dispatch it, write a single JSON reply, close.
    pub async fn handle_connection<S>(&self, stream: S)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader).take(MAX_REQUEST_SIZE as u64);

        // the raw request may carry a password or nsec; zeroize it as soon
        // as it has been parsed, and on the failure path too
        let mut line = Vec::new();
        let request = match reader.read_until(b'\n', &mut line).await {
            Ok(_) => {
                let parsed = serde_json::from_slice::<Request>(&line);
                line.zeroize();
                parsed
            }
            Err(e) => {
                line.zeroize();
                warn!(error = %e, "request read failed");
                return;
            }
        };

        let (reply, shutdown_after) = match request {
            Ok(request) => {
                let is_shutdown = request.method == "shutdown_daemon";
                let reply = self.dispatch(request).await;
                let shutdown_after = is_shutdown && reply.is_ok();
                (reply, shutdown_after)
            }
            Err(e) => (
                Reply::error(String::new(), format!("Invalid request format: {e}")),
                false,
            ),
        };

        match serde_json::to_vec(&reply) {
            Ok(mut buf) => {
                buf.push(b'\n');
                // partial writes are not retried; the client reconnects
                if let Err(e) = writer.write_all(&buf).await {
                    debug!(error = %e, "response write failed");
                }
                let _ = writer.shutdown().await;
            }
            Err(e) => warn!(error = %e, "response serialization failed"),
        }

        if shutdown_after {
            info!("shutdown requested by client");
            self.request_shutdown();
        }
    }
}

/// The `daemon` subcommand: unlock, detach, serve.
pub fn cmd_daemon(out: &Output, store: AccountStore) -> Result<()> {
    out.header("NoorSigner Daemon");

    let npub = resolve_active_account(out, &store)?;
    let nsec = unlock_account(out, &store, &npub)?;
    let keypair = NostrKeypair::from_nsec(&nsec)?;
    drop(nsec);

    let identity = ActiveIdentity::from_keypair(npub, keypair);
    out.success(&format!("Daemon unlocked for: {}", identity.npub));

    if !detach::is_forked_child() {
        let pid = detach::spawn_detached()?;
        out.success("NoorSigner daemon is running in the background");
        out.field("pid", &pid.to_string());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(Arc::new(store), identity))
}

/// Resolve which account the daemon should load, per the startup sequence:
/// the pointer if it names an existing account, otherwise the first account
/// in npub order, otherwise whatever the interactive add-account flow makes.
fn resolve_active_account(out: &Output, store: &AccountStore) -> Result<String> {
    match store.get_active() {
        Ok(npub) if store.exists(&npub) => return Ok(npub),
        Ok(stale) => {
            warn!(npub = %stale, "active account points at a missing account");
            store.clear_active()?;
        }
        Err(SignerError::NoActiveAccount) => {}
        Err(e) => return Err(e),
    }

    let mut accounts = store.list()?;
    if accounts.is_empty() {
        out.info("No accounts found - set one up first.");
        commands::cmd_add_account(out, store)?;
        accounts = store.list()?;
    }

    let first = accounts.first().ok_or(SignerError::NoActiveAccount)?;
    store.set_active(&first.npub)?;
    Ok(first.npub.clone())
}

/// Get the plaintext nsec: from a valid trust session if one exists, else
/// by password, minting a fresh 24-hour session on success.
fn unlock_account(out: &Output, store: &AccountStore, npub: &str) -> Result<Zeroizing<String>> {
    if let Some(session) = store.valid_trust(npub, crypto::unix_now())? {
        match session.decrypt_nsec() {
            Ok(nsec) => {
                info!(expires_at = session.expires_at, "unlocked via trust session");
                out.success("Unlocked via trust session - no password required");
                return Ok(nsec);
            }
            Err(e) => {
                warn!(error = %e, "trust session undecryptable, falling back to password");
                store.clear_trust(npub)?;
            }
        }
    }

    out.info("Your password will be cached for 24 hours.");
    let password = commands::get_password("Enter password to unlock NoorSigner daemon")?;

    let spinner = out.spinner("Unlocking");
    let verified = store.verify_password(npub, password.expose_secret());
    spinner.finish();
    let nsec = verified?;

    let session = TrustSession::create(&nsec, crypto::unix_now())?;
    store.save_trust(npub, &session)?;
    out.success("Trust session active for the next 24 hours");

    Ok(nsec)
}

/// Bind the endpoint and run the accept loop until shutdown.
pub async fn serve(store: Arc<AccountStore>, identity: ActiveIdentity) -> Result<()> {
    let npub = identity.npub.clone();
    info!(%npub, "identity loaded");
    run_accept_loop(Daemon::new(store, Some(identity))).await
}

async fn run_accept_loop(daemon: Arc<Daemon>) -> Result<()> {
    let mut endpoint = Endpoint::bind(daemon.store.root())?;
    info!(endpoint = %endpoint.display(), "daemon ready for signing requests");

    spawn_signal_handler(daemon.clone());

    let mut shutdown = daemon.subscribe_shutdown();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = endpoint.accept() => match accepted {
                Ok(stream) => {
                    let daemon = daemon.clone();
                    tokio::spawn(async move { daemon.handle_connection(stream).await });
                }
                Err(e) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }

    endpoint.cleanup();
    daemon.clear_identity().await;
    info!("daemon shutdown complete");
    Ok(())
}

fn spawn_signal_handler(daemon: Arc<Daemon>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        daemon.request_shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use noorsigner_core::crypto::KdfParams;
    use tempfile::{tempdir, TempDir};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::transport;

    const PASSWORD: &str = "socket test password";

    struct Served {
        dir: TempDir,
        daemon: Arc<Daemon>,
        keypair: NostrKeypair,
        server: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start_served_daemon() -> Served {
        let dir = tempdir().unwrap();
        let store = Arc::new(
            AccountStore::open(dir.path().to_path_buf())
                .unwrap()
                .with_kdf(KdfParams::TESTING),
        );

        let keypair = NostrKeypair::generate().unwrap();
        let info = store.add_account(&keypair.to_nsec(), PASSWORD).unwrap();
        store.set_active(&info.npub).unwrap();

        let identity = ActiveIdentity::from_keypair(info.npub, keypair.clone());
        let daemon = Daemon::new(store, Some(identity));
        let server = tokio::spawn(run_accept_loop(daemon.clone()));

        let socket = dir.path().join(transport::SOCKET_FILE);
        for _ in 0..200 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(socket.exists(), "daemon did not bind its socket");

        Served {
            dir,
            daemon,
            keypair,
            server,
        }
    }

    async fn call_raw(root: &Path, request: &str) -> Reply {
        let mut stream = transport::connect(root).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_socket_end_to_end() {
        let served = start_served_daemon().await;
        let root = served.dir.path();

        // socket is user-only
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(root.join(transport::SOCKET_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let reply = call_raw(root, r#"{"id":"1","method":"get_npub"}"#).await;
        assert_eq!(reply.signature.unwrap(), served.keypair.to_npub());

        // malformed JSON gets an empty-id error and a clean close
        let reply = call_raw(root, "{not json").await;
        assert_eq!(reply.id, "");
        assert!(reply
            .error
            .unwrap()
            .starts_with("Invalid request format:"));

        // shutdown_daemon answers, then the daemon exits and unlinks the
        // socket
        let reply = call_raw(root, r#"{"id":"x","method":"shutdown_daemon"}"#).await;
        assert_eq!(reply.signature.unwrap(), "success");

        let result = tokio::time::timeout(Duration::from_secs(5), served.server)
            .await
            .expect("daemon did not shut down")
            .unwrap();
        assert!(result.is_ok());
        assert!(!root.join(transport::SOCKET_FILE).exists());

        // the key was dropped on the way out
        assert!(served.daemon.identity.read().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_socket_eos_framing() {
        let served = start_served_daemon().await;

        // no trailing newline: the request is framed by end-of-stream
        let mut stream = transport::connect(served.dir.path()).await.unwrap();
        stream
            .write_all(br#"{"id":"eos","method":"get_npub"}"#)
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let reply: Reply = serde_json::from_slice(&buf).unwrap();
        assert_eq!(reply.id, "eos");
        assert_eq!(reply.signature.unwrap(), served.keypair.to_npub());

        served.daemon.request_shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), served.server).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stale_socket_is_replaced() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(transport::SOCKET_FILE), b"stale").unwrap();

        let store = Arc::new(
            AccountStore::open(dir.path().to_path_buf())
                .unwrap()
                .with_kdf(KdfParams::TESTING),
        );
        let keypair = NostrKeypair::generate().unwrap();
        let info = store.add_account(&keypair.to_nsec(), PASSWORD).unwrap();
        let identity = ActiveIdentity::from_keypair(info.npub, keypair);
        let daemon = Daemon::new(store, Some(identity));

        let server = tokio::spawn(run_accept_loop(daemon.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let reply = call_raw(dir.path(), r#"{"id":"1","method":"get_active_account"}"#).await;
        assert_eq!(reply.is_unlocked, Some(true));

        daemon.request_shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(5), server).await;
    }
}
