// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "noorsigner")]
#[command(about = "Local key-custody daemon for Nostr")]
#[command(version)]
pub(crate) struct Cli {
    #[arg(
        short,
        long,
        global = true,
        help = "Storage root (default ~/.noorsigner)"
    )]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Add a new account (nsec + password)
    AddAccount,
    /// List all stored accounts
    ListAccounts,
    /// Switch the active account (npub or hex pubkey)
    Switch { account: String },
    /// Remove an account (npub or hex pubkey)
    RemoveAccount { account: String },
    /// Show the active account
    Active,
    /// Start the signing daemon
    Daemon,
    /// Stop a running daemon
    Stop,
    /// Manage login autostart for the daemon
    Autostart {
        #[command(subcommand)]
        command: AutostartCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum AutostartCommands {
    Enable,
    Disable,
    Status,
}
