// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! NIP-04 message encryption (deprecated but widely deployed).
//!
//! AES-256-CBC with PKCS#7 padding keyed directly by the ECDH shared x
//! coordinate; payload form `base64(ciphertext) "?iv=" base64(iv)`.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::random_bytes;
use crate::error::{Result, SignerError};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_SIZE: usize = 16;

/// Encrypt a plaintext under the shared secret, returning the
/// `base64(ct)?iv=base64(iv)` payload.
pub fn encrypt(plaintext: &str, shared_x: &[u8; 32]) -> Result<String> {
    let iv: [u8; IV_SIZE] = random_bytes();

    let ciphertext = Aes256CbcEnc::new(shared_x.into(), (&iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!(
        "{}?iv={}",
        BASE64.encode(ciphertext),
        BASE64.encode(iv)
    ))
}

/// Decrypt a `base64(ct)?iv=base64(iv)` payload under the shared secret.
///
/// # Errors
///
/// Returns [`SignerError::DecryptionFailed`] for malformed payloads, bad
/// base64, or invalid padding after decryption.
pub fn decrypt(payload: &str, shared_x: &[u8; 32]) -> Result<Zeroizing<String>> {
    let (ciphertext_b64, iv_b64) = payload
        .split_once("?iv=")
        .ok_or(SignerError::DecryptionFailed)?;

    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|_| SignerError::DecryptionFailed)?;
    let iv: [u8; IV_SIZE] = BASE64
        .decode(iv_b64)
        .ok()
        .and_then(|iv| iv.try_into().ok())
        .ok_or(SignerError::DecryptionFailed)?;

    let plaintext = Aes256CbcDec::new(shared_x.into(), (&iv).into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| SignerError::DecryptionFailed)?;

    let text = String::from_utf8(plaintext).map_err(|e| {
        let mut bytes = e.into_bytes();
        bytes.zeroize();
        SignerError::DecryptionFailed
    })?;

    Ok(Zeroizing::new(text))
}
