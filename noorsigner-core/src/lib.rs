// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Key custody primitives for the NoorSigner daemon.
//!
//! This crate provides everything below the IPC layer:
//!
//! - **Key codecs** — bech32 `nsec`/`npub`, hex, BIP-340 Schnorr signing
//! - **Custody encryption** — scrypt key derivation plus XChaCha20-Poly1305
//!   encryption of keys at rest, and the 24-hour trust session cache
//! - **Event hashing** — NIP-01 canonical serialization and SHA-256
//! - **Message encryption** — NIP-44 v2 and NIP-04
//! - **Account store** — per-`npub` directories, the active-account pointer,
//!   and the one-shot migration from the legacy single-account layout

#![forbid(unsafe_code)]

pub mod crypto;
pub mod error;
pub mod event;
pub mod keys;
pub mod nip04;
pub mod nip44;
pub mod store;

use std::path::PathBuf;

use crate::error::{Result, SignerError};

/// Returns the default storage root (`~/.noorsigner`).
pub fn default_signer_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".noorsigner"))
        .ok_or(SignerError::HomeNotFound)
}
