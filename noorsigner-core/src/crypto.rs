//! Password-based custody encryption and trust sessions.
//!
//! Keys at rest are encrypted with XChaCha20-Poly1305 under a scrypt-derived
//! key (NIP-49 cost parameters). The trust session caches the unlocked key
//! for 24 hours, encrypted under a random one-shot token that lives next to
//! it on disk; the token is regenerated on every fresh unlock.

#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::XChaCha20Poly1305;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, SignerError};

/// Salt size for key derivation.
pub const SALT_SIZE: usize = 16;
/// XChaCha20-Poly1305 nonce size.
pub const NONCE_SIZE: usize = 24;
/// Derived encryption key size.
pub const KEY_SIZE: usize = 32;
/// Authentication tag size.
pub const TAG_SIZE: usize = 16;
/// Trust-session token size; the token doubles as the session AEAD key.
pub const SESSION_TOKEN_SIZE: usize = 32;
/// Trust sessions expire 24 hours after creation.
pub const TRUST_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// scrypt cost parameters.
#[derive(Clone, Copy, Debug)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost.
    pub log_n: u8,
    /// Block size.
    pub r: u32,
    /// Parallelization.
    pub p: u32,
}

impl KdfParams {
    /// NIP-49 parameters (N=16384, r=8, p=1).
    pub const DEFAULT: Self = Self {
        log_n: 14,
        r: 8,
        p: 1,
    };

    /// Fast parameters for testing only.
    pub const TESTING: Self = Self {
        log_n: 6,
        r: 8,
        p: 1,
    };
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Derive an encryption key from a password using scrypt.
pub fn derive_key(
    password: &[u8],
    salt: &[u8; SALT_SIZE],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let params = scrypt::Params::new(params.log_n, params.r, params.p, KEY_SIZE)
        .map_err(|e| SignerError::Encryption(format!("scrypt params: {e}")))?;

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    scrypt::scrypt(password, salt, &params, &mut *key)
        .map_err(|e| SignerError::Encryption(format!("scrypt: {e}")))?;

    Ok(key)
}

/// Generate cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn hex_field<const N: usize>(field: &str, what: &str) -> Result<[u8; N]> {
    let data =
        hex::decode(field).map_err(|_| SignerError::CorruptKeyFile(format!("invalid {what}")))?;
    if data.len() != N {
        return Err(SignerError::CorruptKeyFile(format!("invalid {what}")));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&data);
    Ok(out)
}

/// A password-encrypted key as stored on disk.
///
/// On-disk form: `hex(salt) ":" hex(nonce) ":" hex(ciphertext_with_tag)`.
#[derive(Clone)]
pub struct EncryptedKey {
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedKey {
    /// Serialize to the on-disk text form.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}",
            hex::encode(self.salt),
            hex::encode(self.nonce),
            hex::encode(&self.ciphertext)
        )
    }

    /// Parse the on-disk text form. Strict: exactly three hex fields.
    pub fn parse(content: &str) -> Result<Self> {
        let mut fields = content.trim_end().split(':');
        let (Some(salt), Some(nonce), Some(ciphertext), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(SignerError::CorruptKeyFile(
                "expected salt:nonce:ciphertext".into(),
            ));
        };

        let ciphertext = hex::decode(ciphertext)
            .map_err(|_| SignerError::CorruptKeyFile("invalid ciphertext".into()))?;
        if ciphertext.len() < TAG_SIZE {
            return Err(SignerError::CorruptKeyFile("ciphertext too short".into()));
        }

        Ok(Self {
            salt: hex_field(salt, "salt")?,
            nonce: hex_field(nonce, "nonce")?,
            ciphertext,
        })
    }
}

/// Encrypt an nsec with a password.
pub fn encrypt_nsec(nsec: &str, password: &[u8], params: KdfParams) -> Result<EncryptedKey> {
    let salt: [u8; SALT_SIZE] = random_bytes();
    let key = derive_key(password, &salt, params)?;

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&*key));
    let nonce: [u8; NONCE_SIZE] = random_bytes();
    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&nonce), nsec.as_bytes())
        .map_err(|_| SignerError::Encryption("key encryption failed".into()))?;

    Ok(EncryptedKey {
        salt,
        nonce,
        ciphertext,
    })
}

/// Decrypt an nsec with a password.
///
/// # Errors
///
/// Returns [`SignerError::InvalidPassword`] when authentication fails, which
/// covers both a wrong password and a tampered ciphertext.
pub fn decrypt_nsec(
    encrypted: &EncryptedKey,
    password: &[u8],
    params: KdfParams,
) -> Result<Zeroizing<String>> {
    let key = derive_key(password, &encrypted.salt, params)?;

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&*key));
    let plaintext = cipher
        .decrypt(
            GenericArray::from_slice(&encrypted.nonce),
            encrypted.ciphertext.as_ref(),
        )
        .map_err(|_| SignerError::InvalidPassword)?;

    let nsec = String::from_utf8(plaintext).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        SignerError::CorruptKeyFile("decrypted key is not UTF-8".into())
    })?;

    Ok(Zeroizing::new(nsec))
}

/// A 24-hour cache of the unlocked nsec, encrypted under a random token.
///
/// On-disk form:
/// `hex(token) ":" expires_unix ":" created_unix ":" hex(nonce || ciphertext)`.
pub struct TrustSession {
    pub token: [u8; SESSION_TOKEN_SIZE],
    pub created_at: i64,
    pub expires_at: i64,
    pub ciphertext: Vec<u8>,
}

impl TrustSession {
    /// Create a fresh session caching `nsec`, valid for 24 hours from `now`.
    pub fn create(nsec: &str, now: i64) -> Result<Self> {
        let token: [u8; SESSION_TOKEN_SIZE] = random_bytes();

        let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&token));
        let nonce: [u8; NONCE_SIZE] = random_bytes();
        let encrypted = cipher
            .encrypt(GenericArray::from_slice(&nonce), nsec.as_bytes())
            .map_err(|_| SignerError::Encryption("trust session encryption failed".into()))?;

        let mut ciphertext = Vec::with_capacity(NONCE_SIZE + encrypted.len());
        ciphertext.extend_from_slice(&nonce);
        ciphertext.extend_from_slice(&encrypted);

        Ok(Self {
            token,
            created_at: now,
            expires_at: now + TRUST_SESSION_TTL_SECS,
            ciphertext,
        })
    }

    /// Decrypt the cached nsec with the session token.
    pub fn decrypt_nsec(&self) -> Result<Zeroizing<String>> {
        if self.ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SignerError::DecryptionFailed);
        }
        let (nonce, encrypted) = self.ciphertext.split_at(NONCE_SIZE);

        let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&self.token));
        let plaintext = cipher
            .decrypt(GenericArray::from_slice(nonce), encrypted)
            .map_err(|_| SignerError::DecryptionFailed)?;

        let nsec = String::from_utf8(plaintext).map_err(|e| {
            let mut bytes = e.into_bytes();
            bytes.zeroize();
            SignerError::DecryptionFailed
        })?;

        Ok(Zeroizing::new(nsec))
    }

    /// A session is valid strictly before its expiry instant.
    pub fn is_valid(&self, now: i64) -> bool {
        now < self.expires_at
    }

    /// Serialize to the on-disk text form.
    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            hex::encode(self.token),
            self.expires_at,
            self.created_at,
            hex::encode(&self.ciphertext)
        )
    }

    /// Parse the on-disk text form. Strict: exactly four `:`-separated
    /// fields with decimal Unix-second timestamps.
    pub fn parse(content: &str) -> Result<Self> {
        let fields: Vec<&str> = content.trim_end().split(':').collect();
        if fields.len() != 4 {
            return Err(SignerError::CorruptTrustSession(format!(
                "expected 4 fields, got {}",
                fields.len()
            )));
        }

        let token = hex::decode(fields[0])
            .ok()
            .and_then(|t| <[u8; SESSION_TOKEN_SIZE]>::try_from(t).ok())
            .ok_or_else(|| SignerError::CorruptTrustSession("invalid token".into()))?;

        let expires_at: i64 = fields[1]
            .parse()
            .map_err(|_| SignerError::CorruptTrustSession("invalid expiry timestamp".into()))?;
        let created_at: i64 = fields[2]
            .parse()
            .map_err(|_| SignerError::CorruptTrustSession("invalid created timestamp".into()))?;

        let ciphertext = hex::decode(fields[3])
            .map_err(|_| SignerError::CorruptTrustSession("invalid ciphertext".into()))?;

        Ok(Self {
            token,
            created_at,
            expires_at,
            ciphertext,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NSEC: &str = "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let encrypted = encrypt_nsec(NSEC, b"hunter2hunter2", KdfParams::TESTING).unwrap();
        let decrypted = decrypt_nsec(&encrypted, b"hunter2hunter2", KdfParams::TESTING).unwrap();
        assert_eq!(&*decrypted, NSEC);
    }

    #[test]
    fn test_wrong_password_fails() {
        let encrypted = encrypt_nsec(NSEC, b"correct password", KdfParams::TESTING).unwrap();
        let result = decrypt_nsec(&encrypted, b"wrong password", KdfParams::TESTING);
        assert!(matches!(result, Err(SignerError::InvalidPassword)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut encrypted = encrypt_nsec(NSEC, b"password123", KdfParams::TESTING).unwrap();
        encrypted.ciphertext[0] ^= 0x01;
        let result = decrypt_nsec(&encrypted, b"password123", KdfParams::TESTING);
        assert!(matches!(result, Err(SignerError::InvalidPassword)));
    }

    #[test]
    fn test_encrypted_key_encode_parse() {
        let encrypted = encrypt_nsec(NSEC, b"password123", KdfParams::TESTING).unwrap();
        let parsed = EncryptedKey::parse(&encrypted.encode()).unwrap();
        assert_eq!(parsed.salt, encrypted.salt);
        assert_eq!(parsed.nonce, encrypted.nonce);
        assert_eq!(parsed.ciphertext, encrypted.ciphertext);
    }

    #[test]
    fn test_encrypted_key_parse_rejects_bad_forms() {
        assert!(EncryptedKey::parse("").is_err());
        assert!(EncryptedKey::parse("aabb:ccdd").is_err());
        assert!(EncryptedKey::parse("aabb:ccdd:eeff:0011").is_err());
        assert!(EncryptedKey::parse("zz:ccdd:eeff").is_err());
        // legacy two-field XOR blobs are not readable
        assert!(EncryptedKey::parse(&format!("{}:{}", "ab".repeat(16), "cd".repeat(63))).is_err());
    }

    #[test]
    fn test_trust_session_roundtrip() {
        let now = unix_now();
        let session = TrustSession::create(NSEC, now).unwrap();

        assert_eq!(session.expires_at - session.created_at, TRUST_SESSION_TTL_SECS);
        assert_eq!(&*session.decrypt_nsec().unwrap(), NSEC);

        let parsed = TrustSession::parse(&session.encode()).unwrap();
        assert_eq!(parsed.token, session.token);
        assert_eq!(parsed.created_at, session.created_at);
        assert_eq!(parsed.expires_at, session.expires_at);
        assert_eq!(&*parsed.decrypt_nsec().unwrap(), NSEC);
    }

    #[test]
    fn test_trust_session_expiry_boundary() {
        let now = unix_now();
        let session = TrustSession::create(NSEC, now).unwrap();

        assert!(session.is_valid(now));
        assert!(session.is_valid(session.expires_at - 1));
        // expires_at == now counts as expired
        assert!(!session.is_valid(session.expires_at));
        assert!(!session.is_valid(session.expires_at + 1));
    }

    #[test]
    fn test_trust_session_wrong_token_fails() {
        let mut session = TrustSession::create(NSEC, unix_now()).unwrap();
        session.token[0] ^= 0x01;
        assert!(matches!(
            session.decrypt_nsec(),
            Err(SignerError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_trust_session_parse_rejects_bad_forms() {
        assert!(TrustSession::parse("a:b:c").is_err());
        assert!(TrustSession::parse("a:b:c:d:e").is_err());

        let session = TrustSession::create(NSEC, unix_now()).unwrap();
        let encoded = session.encode();
        let bad_ts = encoded.replacen(&session.expires_at.to_string(), "soon", 1);
        assert!(TrustSession::parse(&bad_ts).is_err());
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt: [u8; SALT_SIZE] = random_bytes();
        let a = derive_key(b"password", &salt, KdfParams::TESTING).unwrap();
        let b = derive_key(b"password", &salt, KdfParams::TESTING).unwrap();
        assert_eq!(*a, *b);

        let c = derive_key(b"different", &salt, KdfParams::TESTING).unwrap();
        assert_ne!(*a, *c);
    }
}
