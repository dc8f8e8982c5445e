// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The local IPC endpoint.
//!
//! Unix-likes get a stream socket at `<root>/noorsigner.sock` with mode
//! `0600`; Windows gets the named pipe `\\.\pipe\noorsigner` with default
//! (current-user) security. One daemon per user; a stale socket file left by
//! a crashed daemon is unlinked before bind, while an endpoint that is
//! actually in use fails the bind and signals a running instance.

use std::path::Path;

#[cfg(unix)]
pub const SOCKET_FILE: &str = "noorsigner.sock";
#[cfg(windows)]
pub const PIPE_NAME: &str = r"\\.\pipe\noorsigner";

#[cfg(unix)]
pub use unix::{connect, Endpoint, Stream};
#[cfg(windows)]
pub use windows::{connect, Endpoint, Stream};

#[cfg(unix)]
mod unix {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use tokio::net::{UnixListener, UnixStream};
    use tracing::debug;

    use noorsigner_core::error::Result;

    pub type Stream = UnixStream;

    pub fn socket_path(root: &Path) -> PathBuf {
        root.join(super::SOCKET_FILE)
    }

    pub struct Endpoint {
        listener: UnixListener,
        path: PathBuf,
    }

    impl Endpoint {
        pub fn bind(root: &Path) -> Result<Self> {
            let path = socket_path(root);
            if path.exists() {
                debug!(path = %path.display(), "removing stale socket");
                fs::remove_file(&path)?;
            }

            let listener = UnixListener::bind(&path)?;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

            Ok(Self { listener, path })
        }

        pub async fn accept(&mut self) -> Result<Stream> {
            let (stream, _) = self.listener.accept().await?;
            Ok(stream)
        }

        pub fn cleanup(&self) {
            let _ = fs::remove_file(&self.path);
        }

        pub fn display(&self) -> String {
            self.path.display().to_string()
        }
    }

    pub async fn connect(root: &Path) -> Result<Stream> {
        Ok(UnixStream::connect(socket_path(root)).await?)
    }
}

#[cfg(windows)]
mod windows {
    use std::path::Path;

    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    use noorsigner_core::error::Result;

    pub type Stream = NamedPipeServer;

    pub struct Endpoint {
        server: NamedPipeServer,
    }

    impl Endpoint {
        pub fn bind(_root: &Path) -> Result<Self> {
            let server = ServerOptions::new()
                .first_pipe_instance(true)
                .create(super::PIPE_NAME)?;
            Ok(Self { server })
        }

        pub async fn accept(&mut self) -> Result<Stream> {
            let next = ServerOptions::new().create(super::PIPE_NAME)?;
            let server = std::mem::replace(&mut self.server, next);
            server.connect().await?;
            Ok(server)
        }

        // the OS reclaims named pipes when the last handle closes
        pub fn cleanup(&self) {}

        pub fn display(&self) -> String {
            super::PIPE_NAME.to_string()
        }
    }

    pub async fn connect(_root: &Path) -> Result<NamedPipeClient> {
        Ok(ClientOptions::new().open(super::PIPE_NAME)?)
    }
}

/// True when a daemon endpoint for this root appears to exist.
pub fn endpoint_present(root: &Path) -> bool {
    #[cfg(unix)]
    {
        unix::socket_path(root).exists()
    }
    #[cfg(windows)]
    {
        let _ = root;
        std::path::Path::new(PIPE_NAME).exists()
    }
}

