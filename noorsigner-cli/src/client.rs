// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! One-shot IPC client used by the CLI subcommands.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use zeroize::Zeroize;

use noorsigner_core::error::{Result, SignerError};

use crate::ipc::{Reply, Request};
use crate::transport;

/// Send one request and read the single reply.
pub async fn call(root: &Path, request: &Request) -> Result<Reply> {
    debug!(method = %request.method, "ipc call");
    let mut stream = transport::connect(root).await?;

    // the serialized request may carry a password or nsec
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    let written = stream.write_all(&line).await;
    line.zeroize();
    written?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;

    Ok(serde_json::from_slice(&buf)?)
}

/// Blocking wrapper for synchronous CLI paths.
pub fn call_blocking(root: &Path, request: &Request) -> Result<Reply> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(call(root, request))
}

/// Probe whether a daemon is serving this root.
pub fn daemon_running(root: &Path) -> bool {
    if !transport::endpoint_present(root) {
        return false;
    }
    call_blocking(root, &Request::new("probe", "get_npub")).is_ok()
}

/// Live-switch a running daemon to another account.
pub fn switch_via_daemon(root: &Path, npub: &str, password: &str) -> Result<Reply> {
    let mut request = Request::new("cli-switch", "switch_account");
    request.npub = Some(npub.to_string());
    request.password = Some(password.into());

    let reply = call_blocking(root, &request)?;
    if let Some(error) = &reply.error {
        return Err(SignerError::Other(error.clone()));
    }
    Ok(reply)
}

/// Ask a running daemon to shut down.
pub fn shutdown_daemon(root: &Path) -> Result<()> {
    let reply = call_blocking(root, &Request::new("cli-stop", "shutdown_daemon"))?;
    if let Some(error) = &reply.error {
        return Err(SignerError::Other(error.clone()));
    }
    Ok(())
}

/// Query the running daemon's active account.
pub fn active_account(root: &Path) -> Result<Reply> {
    call_blocking(root, &Request::new("cli-active", "get_active_account"))
}
