// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::Path;

use dialoguer::{theme::ColorfulTheme, Password};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use zeroize::Zeroizing;

use noorsigner_core::error::{Result, SignerError};
use noorsigner_core::store::{AccountStore, PasswordPrompt};

use crate::client;
use crate::output::Output;

const PASSWORD_ENV: &str = "NOORSIGNER_PASSWORD";
const NSEC_ENV: &str = "NOORSIGNER_NSEC";
const MIN_PASSWORD_CHARS: usize = 8;

fn secret_from_env(var_name: &str) -> Option<SecretString> {
    std::env::var(var_name).ok().map(|value| {
        debug!("using secret from {} env var", var_name);
        tracing::warn!(
            "Using secret from {} environment variable. \
             Environment variables may be visible to other processes via /proc on Linux.",
            var_name
        );
        SecretString::from(value)
    })
}

fn read_password(prompt: &str) -> Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()
        .map_err(|e| SignerError::Other(format!("Failed to read password: {e}")))
}

pub fn get_password(prompt: &str) -> Result<SecretString> {
    if let Some(password) = secret_from_env(PASSWORD_ENV) {
        return Ok(password);
    }
    read_password(prompt).map(SecretString::from)
}

/// Prompt for a new account password: confirmed, at least 8 characters.
pub fn get_new_password() -> Result<SecretString> {
    if let Some(password) = secret_from_env(PASSWORD_ENV) {
        return Ok(password);
    }

    loop {
        let password = Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Enter password for encryption")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()
            .map_err(|e| SignerError::Other(format!("Failed to read password: {e}")))?;

        if password.chars().count() < MIN_PASSWORD_CHARS {
            eprintln!("Password must be at least {MIN_PASSWORD_CHARS} characters.");
            continue;
        }

        return Ok(SecretString::from(password));
    }
}

/// Prompt for an nsec with input hidden, like a password.
pub fn get_nsec() -> Result<Zeroizing<String>> {
    if let Ok(nsec) = std::env::var(NSEC_ENV) {
        debug!("using nsec from {} env var", NSEC_ENV);
        return Ok(Zeroizing::new(nsec));
    }

    read_password("Enter your nsec (nsec1... or hex)").map(Zeroizing::new)
}

/// Terminal-backed password provider for the store's migration hook.
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read(&self, prompt: &str) -> Result<Zeroizing<String>> {
        let password = get_password(prompt)?;
        Ok(Zeroizing::new(password.expose_secret().to_string()))
    }
}

/// Resolve a user-supplied identifier (npub or hex pubkey) to an npub.
fn resolve_account(store: &AccountStore, identifier: &str) -> Result<String> {
    if identifier.starts_with("npub1") {
        if store.exists(identifier) {
            return Ok(identifier.to_string());
        }
        return Err(SignerError::AccountNotFound(identifier.to_string()));
    }

    for account in store.list()? {
        if account.pubkey.eq_ignore_ascii_case(identifier) {
            return Ok(account.npub);
        }
    }
    Err(SignerError::AccountNotFound(identifier.to_string()))
}

pub fn cmd_add_account(out: &Output, store: &AccountStore) -> Result<()> {
    out.header("Add Account");
    out.info("Setting up secure nsec storage with password protection");
    out.newline();

    let nsec = get_nsec()?;
    let password = get_new_password()?;

    let spinner = out.spinner("Encrypting key");
    let result = store.add_account(&nsec, password.expose_secret());
    spinner.finish();
    let info = result?;

    store.set_active(&info.npub)?;

    out.newline();
    out.success("Account added and set active");
    out.key_field("npub", &info.npub);
    out.field("pubkey", &info.pubkey);
    Ok(())
}

pub fn cmd_list_accounts(out: &Output, store: &AccountStore) -> Result<()> {
    let accounts = store.list()?;
    if accounts.is_empty() {
        out.info("No accounts found. Use 'add-account' to add one.");
        return Ok(());
    }

    let active = store.get_active().ok();

    out.header("Stored accounts");
    for account in &accounts {
        let marker = if active.as_deref() == Some(&account.npub) {
            "*"
        } else {
            " "
        };
        out.info(&format!("{marker} {}", account.npub));
    }
    out.newline();
    out.info(&format!("Total: {} account(s)", accounts.len()));
    if active.is_some() {
        out.info("* = active account");
    }
    Ok(())
}

pub fn cmd_switch(out: &Output, store: &AccountStore, identifier: &str) -> Result<()> {
    let npub = resolve_account(store, identifier)?;

    if store.get_active().is_ok_and(|active| active == npub) {
        out.info("This account is already active.");
        return Ok(());
    }

    let password = get_password("Enter password for this account")?;

    let spinner = out.spinner("Verifying password");
    let verified = store.verify_password(&npub, password.expose_secret());
    spinner.finish();
    let _nsec = verified?;

    store.set_active(&npub)?;

    if client::daemon_running(store.root()) {
        out.info("Daemon detected, switching live...");
        match client::switch_via_daemon(store.root(), &npub, password.expose_secret()) {
            Ok(_) => {
                out.success(&format!("Switched to account: {npub}"));
                out.info("Daemon updated - no restart needed.");
            }
            Err(e) => {
                out.warn(&format!("Could not switch daemon: {e}"));
                out.info("Restart it manually: noorsigner stop && noorsigner daemon");
            }
        }
    } else {
        out.success(&format!("Switched to account: {npub}"));
        out.info("Daemon not running. Start with: noorsigner daemon");
    }
    Ok(())
}

pub fn cmd_remove_account(out: &Output, store: &AccountStore, identifier: &str) -> Result<()> {
    let npub = resolve_account(store, identifier)?;

    let password = get_password("Enter password to confirm removal")?;

    let spinner = out.spinner("Verifying password");
    let verified = store.verify_password(&npub, password.expose_secret());
    spinner.finish();
    let _nsec = verified?;

    if client::daemon_running(store.root()) {
        // a running daemon enforces the cannot-remove-active rule
        let mut request = crate::ipc::Request::new("cli-remove", "remove_account");
        request.npub = Some(npub.clone());
        request.password = Some(password.expose_secret().into());
        let reply = client::call_blocking(store.root(), &request)?;
        if let Some(error) = reply.error {
            return Err(SignerError::Other(error));
        }
    } else {
        store.remove(&npub)?;
    }

    out.success(&format!("Account removed: {npub}"));

    let remaining = store.list()?;
    if remaining.is_empty() {
        out.info("No accounts remaining. Use 'add-account' to add one.");
    } else if store.get_active().is_err() {
        let first = &remaining[0];
        store.set_active(&first.npub)?;
        out.info(&format!("Active account set to: {}", first.npub));
    }
    Ok(())
}

pub fn cmd_active(out: &Output, store: &AccountStore) -> Result<()> {
    if client::daemon_running(store.root()) {
        let reply = client::active_account(store.root())?;
        if let Some(error) = reply.error {
            return Err(SignerError::Other(error));
        }
        out.header("Active account");
        out.key_field("npub", reply.npub.as_deref().unwrap_or("(none)"));
        out.field("pubkey", reply.pubkey.as_deref().unwrap_or("(none)"));
        out.field(
            "unlocked",
            if reply.is_unlocked == Some(true) {
                "yes (daemon running)"
            } else {
                "no"
            },
        );
        return Ok(());
    }

    let npub = store.get_active()?;
    out.header("Active account");
    out.key_field("npub", &npub);
    match noorsigner_core::keys::npub_to_pubkey_hex(&npub) {
        Ok(pubkey) => out.field("pubkey", &pubkey),
        Err(_) => out.warn("active_account file holds an undecodable npub"),
    }
    out.field("unlocked", "no (daemon not running)");
    Ok(())
}

pub fn cmd_stop(out: &Output, root: &Path) -> Result<()> {
    client::shutdown_daemon(root)?;
    out.success("Daemon shutdown requested");
    Ok(())
}

pub fn cmd_autostart(out: &Output, command: &crate::cli::AutostartCommands) -> Result<()> {
    use crate::cli::AutostartCommands;

    match command {
        AutostartCommands::Enable => {
            crate::autostart::enable()?;
            out.success("Autostart enabled");
        }
        AutostartCommands::Disable => {
            crate::autostart::disable()?;
            out.success("Autostart disabled");
        }
        AutostartCommands::Status => {
            let enabled = crate::autostart::status()?;
            out.info(if enabled { "enabled" } else { "disabled" });
        }
    }
    Ok(())
}
