// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! IPC wire types shared by the daemon and the client.
//!
//! One JSON object per connection direction, framed by a newline or end of
//! stream. Unknown request fields are ignored; absent reply fields are
//! omitted from the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

/// Largest request the daemon will read.
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// A wire field carrying secret text (a password or an nsec).
///
/// Serializes as a plain JSON string; the backing buffer is zeroized when
/// the field drops, so every `Request` copy of a secret cleans up after
/// itself. Debug output is redacted.
#[derive(Clone, Default)]
pub struct SecretField(Zeroizing<String>);

impl SecretField {
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SecretField {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretField {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl std::fmt::Debug for SecretField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretField(..)")
    }
}

impl Serialize for SecretField {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub method: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_json: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_pubkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_pubkey: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nsec: Option<SecretField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub npub: Option<String>,
}

impl Request {
    pub fn new(id: &str, method: &str) -> Self {
        Self {
            id: id.to_string(),
            method: method.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub npub: String,
    pub pubkey: String,
    pub created_at: i64,
}

impl From<noorsigner_core::store::AccountInfo> for AccountEntry {
    fn from(info: noorsigner_core::store::AccountInfo) -> Self {
        Self {
            npub: info.npub,
            pubkey: info.pubkey,
            created_at: info.created_at,
        }
    }
}

/// The single reply shape. Signing-style methods answer in `signature`
/// (which also carries npubs, payloads, and status strings, as the protocol
/// has always done); account methods use the richer fields.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub npub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_unlocked: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<AccountEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_pubkey: Option<String>,
}

impl Reply {
    pub fn signature(id: String, value: impl Into<String>) -> Self {
        Self {
            id,
            signature: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn error(id: String, message: impl Into<String>) -> Self {
        Self {
            id,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn account(id: String, pubkey: String, npub: String) -> Self {
        Self {
            id,
            success: Some(true),
            pubkey: Some(pubkey),
            npub: Some(npub),
            ..Self::default()
        }
    }

    pub fn removed(id: String) -> Self {
        Self {
            id,
            success: Some(true),
            ..Self::default()
        }
    }

    pub fn account_list(
        id: String,
        accounts: Vec<AccountEntry>,
        active_pubkey: Option<String>,
    ) -> Self {
        Self {
            id,
            accounts: Some(accounts),
            active_pubkey,
            ..Self::default()
        }
    }

    pub fn active_status(
        id: String,
        pubkey: Option<String>,
        npub: Option<String>,
        is_unlocked: bool,
    ) -> Self {
        Self {
            id,
            pubkey,
            npub,
            is_unlocked: Some(is_unlocked),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
