#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Invalid nsec format")]
    InvalidNsec,

    #[error("Invalid npub format")]
    InvalidNpub,

    #[error("Invalid pubkey format")]
    InvalidPubkey,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Password must be at least 8 characters")]
    WeakPassword,

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("No active account set")]
    NoActiveAccount,

    #[error("cannot remove active account - switch to another account first")]
    CannotRemoveActive,

    #[error("Corrupt key file: {0}")]
    CorruptKeyFile(String),

    #[error("Corrupt trust session: {0}")]
    CorruptTrustSession(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Decryption failed - bad ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("{0} required")]
    MissingField(&'static str),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(&'static str),

    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SignerError>;
