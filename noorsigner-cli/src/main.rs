// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

#![forbid(unsafe_code)]

mod autostart;
mod cli;
mod client;
mod commands;
mod config;
mod daemon;
mod detach;
mod ipc;
mod output;
mod transport;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use noorsigner_core::error::Result;
use noorsigner_core::store::AccountStore;

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::output::Output;

fn init_logging(cfg: &Config) {
    let use_json = std::env::var("NOORSIGNER_LOG_JSON").is_ok();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_level.as_str()));

    if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() {
    let (cfg, cfg_err) = match Config::load() {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_logging(&cfg);

    let out = Output::new();
    if let Some(e) = cfg_err {
        out.warn(&format!("Ignoring config file: {e}"));
    }

    if let Err(e) = run(&out, &cfg) {
        out.error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(out: &Output, cfg: &Config) -> Result<()> {
    let cli = Cli::parse();

    let root = match cli.root {
        Some(root) => root,
        None => cfg.signer_root()?,
    };
    debug!(root = %root.display(), "starting command");

    let store = AccountStore::open(root)?;

    // one-shot migration from the legacy single-account layout
    if let Err(e) = store.migrate_legacy(&commands::TerminalPrompt) {
        out.warn(&format!("Migration warning: {e}"));
    }

    match cli.command {
        Commands::AddAccount => commands::cmd_add_account(out, &store),
        Commands::ListAccounts => commands::cmd_list_accounts(out, &store),
        Commands::Switch { account } => commands::cmd_switch(out, &store, &account),
        Commands::RemoveAccount { account } => commands::cmd_remove_account(out, &store, &account),
        Commands::Active => commands::cmd_active(out, &store),
        Commands::Daemon => daemon::cmd_daemon(out, store),
        Commands::Stop => {
            let root = store.root().to_path_buf();
            commands::cmd_stop(out, &root)
        }
        Commands::Autostart { command } => commands::cmd_autostart(out, &command),
    }
}
