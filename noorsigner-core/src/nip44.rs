// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! NIP-44 v2 message encryption.
//!
//! ChaCha20 with HMAC-SHA-256 over a conversation key derived from the ECDH
//! shared secret with HKDF-SHA-256. The MAC is verified before any ciphertext
//! is processed, with a constant-time comparison, and the padding scheme is
//! length-checked rather than branched on.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::random_bytes;
use crate::error::{Result, SignerError};

type HmacSha256 = Hmac<Sha256>;

/// Payload version byte.
pub const VERSION: u8 = 0x02;

const NONCE_SIZE: usize = 32;
const MAC_SIZE: usize = 32;
const CHACHA_KEY_SIZE: usize = 32;
const CHACHA_NONCE_SIZE: usize = 12;
const HMAC_KEY_SIZE: usize = 32;

/// Smallest encryptable plaintext.
pub const MIN_PLAINTEXT_SIZE: usize = 1;
/// Largest encryptable plaintext.
pub const MAX_PLAINTEXT_SIZE: usize = 65535;

// version || nonce || padded ciphertext (>= 2 + 32) || mac
const MIN_PAYLOAD_SIZE: usize = 1 + NONCE_SIZE + 2 + 32 + MAC_SIZE;

/// Derive the conversation key for a `(self, peer)` pair from the ECDH
/// shared x coordinate.
pub fn conversation_key(shared_x: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(b"nip44-v2".as_slice()), shared_x);

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(prk.as_slice());
    key
}

struct MessageKeys {
    chacha_key: Zeroizing<[u8; CHACHA_KEY_SIZE]>,
    chacha_nonce: [u8; CHACHA_NONCE_SIZE],
    hmac_key: Zeroizing<[u8; HMAC_KEY_SIZE]>,
}

fn message_keys(conversation_key: &[u8; 32], nonce: &[u8; NONCE_SIZE]) -> Result<MessageKeys> {
    let hk = Hkdf::<Sha256>::from_prk(conversation_key)
        .map_err(|_| SignerError::Encryption("invalid conversation key".into()))?;

    let mut okm = Zeroizing::new([0u8; CHACHA_KEY_SIZE + CHACHA_NONCE_SIZE + HMAC_KEY_SIZE]);
    hk.expand(nonce, &mut *okm)
        .map_err(|_| SignerError::Encryption("hkdf expand failed".into()))?;

    let mut chacha_key = Zeroizing::new([0u8; CHACHA_KEY_SIZE]);
    chacha_key.copy_from_slice(&okm[..CHACHA_KEY_SIZE]);

    let mut chacha_nonce = [0u8; CHACHA_NONCE_SIZE];
    chacha_nonce.copy_from_slice(&okm[CHACHA_KEY_SIZE..CHACHA_KEY_SIZE + CHACHA_NONCE_SIZE]);

    let mut hmac_key = Zeroizing::new([0u8; HMAC_KEY_SIZE]);
    hmac_key.copy_from_slice(&okm[CHACHA_KEY_SIZE + CHACHA_NONCE_SIZE..]);

    Ok(MessageKeys {
        chacha_key,
        chacha_nonce,
        hmac_key,
    })
}

fn padded_len(unpadded: usize) -> usize {
    if unpadded <= 32 {
        return 32;
    }
    // next power of two strictly greater than unpadded - 1
    let next_power = 1usize << (usize::BITS - (unpadded - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((unpadded - 1) / chunk + 1)
}

fn hmac_aad(hmac_key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(hmac_key)
        .map_err(|_| SignerError::Encryption("invalid hmac key".into()))?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac)
}

/// Encrypt a plaintext under a conversation key, returning the base64
/// payload.
pub fn encrypt(plaintext: &str, conversation_key: &[u8; 32]) -> Result<String> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT_SIZE..=MAX_PLAINTEXT_SIZE).contains(&len) {
        return Err(SignerError::Encryption(format!(
            "plaintext length {len} out of range"
        )));
    }

    let nonce: [u8; NONCE_SIZE] = random_bytes();
    let keys = message_keys(conversation_key, &nonce)?;

    let mut buffer = vec![0u8; 2 + padded_len(len)];
    buffer[..2].copy_from_slice(&(len as u16).to_be_bytes());
    buffer[2..2 + len].copy_from_slice(plaintext.as_bytes());

    let mut cipher = ChaCha20::new((&*keys.chacha_key).into(), (&keys.chacha_nonce).into());
    cipher.apply_keystream(&mut buffer);

    let mac = hmac_aad(&*keys.hmac_key, &nonce, &buffer)?
        .finalize()
        .into_bytes();

    let mut payload = Vec::with_capacity(1 + NONCE_SIZE + buffer.len() + MAC_SIZE);
    payload.push(VERSION);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&buffer);
    payload.extend_from_slice(mac.as_slice());

    Ok(BASE64.encode(payload))
}

/// Decrypt a base64 payload under a conversation key.
///
/// # Errors
///
/// Returns [`SignerError::DecryptionFailed`] for any malformed, tampered,
/// or wrong-key payload.
pub fn decrypt(payload: &str, conversation_key: &[u8; 32]) -> Result<Zeroizing<String>> {
    // NIP-44 reserves a "#" prefix for non-base64 future encodings.
    if payload.starts_with('#') {
        return Err(SignerError::DecryptionFailed);
    }

    let data = BASE64
        .decode(payload)
        .map_err(|_| SignerError::DecryptionFailed)?;
    if data.len() < MIN_PAYLOAD_SIZE || data[0] != VERSION {
        return Err(SignerError::DecryptionFailed);
    }

    let nonce: [u8; NONCE_SIZE] = data[1..1 + NONCE_SIZE]
        .try_into()
        .map_err(|_| SignerError::DecryptionFailed)?;
    let ciphertext = &data[1 + NONCE_SIZE..data.len() - MAC_SIZE];
    let mac = &data[data.len() - MAC_SIZE..];

    let keys = message_keys(conversation_key, &nonce)?;

    hmac_aad(&*keys.hmac_key, &nonce, ciphertext)?
        .verify_slice(mac)
        .map_err(|_| SignerError::DecryptionFailed)?;

    let mut buffer = ciphertext.to_vec();
    let mut cipher = ChaCha20::new((&*keys.chacha_key).into(), (&keys.chacha_nonce).into());
    cipher.apply_keystream(&mut buffer);

    let len = u16::from_be_bytes([buffer[0], buffer[1]]) as usize;
    if len < MIN_PLAINTEXT_SIZE || 2 + len > buffer.len() || buffer.len() != 2 + padded_len(len) {
        buffer.zeroize();
        return Err(SignerError::DecryptionFailed);
    }

    let plaintext = String::from_utf8(buffer[2..2 + len].to_vec()).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        SignerError::DecryptionFailed
    });
    buffer.zeroize();

    Ok(Zeroizing::new(plaintext?))
}
