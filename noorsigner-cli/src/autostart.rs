// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Login autostart for the daemon.
//!
//! macOS gets a LaunchAgent plist, Linux an XDG autostart desktop entry.
//! Other platforms report themselves unsupported.

use noorsigner_core::error::{Result, SignerError};

/// Install autostart for the current platform.
pub fn enable() -> Result<()> {
    platform::enable()
}

/// Remove autostart for the current platform. Missing entries are fine.
pub fn disable() -> Result<()> {
    platform::disable()
}

/// Whether autostart is currently installed.
pub fn status() -> Result<bool> {
    platform::status()
}

fn home_dir() -> Result<std::path::PathBuf> {
    dirs::home_dir().ok_or(SignerError::HomeNotFound)
}

fn remove_entry(path: &std::path::Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use std::fs;
    use std::path::PathBuf;

    use noorsigner_core::error::Result;

    const LABEL: &str = "com.noorsigner.daemon";

    fn plist_path() -> Result<PathBuf> {
        Ok(super::home_dir()?
            .join("Library")
            .join("LaunchAgents")
            .join(format!("{LABEL}.plist")))
    }

    pub fn status() -> Result<bool> {
        Ok(plist_path()?.exists())
    }

    pub fn enable() -> Result<()> {
        let home = super::home_dir()?;
        let exe = std::env::current_exe()?;
        let path = plist_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let plist = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{exe}</string>
        <string>daemon</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
    <key>StandardOutPath</key>
    <string>{home}/Library/Logs/noorsigner-stdout.log</string>
    <key>StandardErrorPath</key>
    <string>{home}/Library/Logs/noorsigner-stderr.log</string>
</dict>
</plist>
"#,
            exe = exe.display(),
            home = home.display(),
        );

        fs::write(path, plist)?;
        Ok(())
    }

    pub fn disable() -> Result<()> {
        super::remove_entry(&plist_path()?)
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::fs;
    use std::path::PathBuf;

    use noorsigner_core::error::Result;

    fn desktop_path() -> Result<PathBuf> {
        Ok(super::home_dir()?
            .join(".config")
            .join("autostart")
            .join("noorsigner.desktop"))
    }

    pub fn status() -> Result<bool> {
        Ok(desktop_path()?.exists())
    }

    pub fn enable() -> Result<()> {
        let exe = std::env::current_exe()?;
        let path = desktop_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let desktop = format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name=NoorSigner Daemon\n\
             Comment=Nostr key signing daemon\n\
             Exec={} daemon\n\
             Terminal=false\n\
             Hidden=false\n\
             X-GNOME-Autostart-enabled=true\n",
            exe.display(),
        );

        fs::write(path, desktop)?;
        Ok(())
    }

    pub fn disable() -> Result<()> {
        super::remove_entry(&desktop_path()?)
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
mod platform {
    use noorsigner_core::error::{Result, SignerError};

    pub fn status() -> Result<bool> {
        Err(SignerError::UnsupportedPlatform(std::env::consts::OS))
    }

    pub fn enable() -> Result<()> {
        Err(SignerError::UnsupportedPlatform(std::env::consts::OS))
    }

    pub fn disable() -> Result<()> {
        Err(SignerError::UnsupportedPlatform(std::env::consts::OS))
    }
}
