// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Detached re-exec of the daemon child.
//!
//! The parent unlocks the key interactively, then re-executes itself with
//! the fork marker set so the child rehydrates from the trust session and
//! serves in the background with no controlling terminal.

use std::process::{Command, Stdio};

use noorsigner_core::error::Result;

/// Environment marker telling the child it is the detached daemon instance.
pub const FORKED_ENV: &str = "NOORSIGNER_FORKED";

/// True when this process is already the detached child.
pub fn is_forked_child() -> bool {
    std::env::var(FORKED_ENV).as_deref() == Ok("1")
}

/// Spawn a detached copy of the current invocation and return its PID.
pub fn spawn_detached() -> Result<u32> {
    let exe = std::env::current_exe()?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut command = Command::new(exe);
    command
        .args(&args)
        .env(FORKED_ENV, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = command.spawn()?;
    Ok(child.id())
}
