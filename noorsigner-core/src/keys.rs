// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Key types and Nostr keypair operations.
use bech32::{Bech32, Hrp};
use k256::elliptic_curve::group::GroupEncoding;
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::PrimeField;
use k256::schnorr::SigningKey;
use k256::{AffinePoint, ProjectivePoint, Scalar};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto;
use crate::error::{Result, SignerError};

const NSEC_HRP: Hrp = Hrp::parse_unchecked("nsec");
const NPUB_HRP: Hrp = Hrp::parse_unchecked("npub");

/// A Nostr keypair with a zeroize-on-drop secret key.
///
/// The public key is the 32-byte x-only serialization (BIP-340).
pub struct NostrKeypair {
    secret_key: Zeroizing<[u8; 32]>,
    public_key: [u8; 32],
}

impl NostrKeypair {
    /// Generate a new random keypair.
    pub fn generate() -> Result<Self> {
        const MAX_RETRIES: usize = 64;
        for _ in 0..MAX_RETRIES {
            let mut secret_bytes: [u8; 32] = crypto::random_bytes();
            if SigningKey::from_bytes(&secret_bytes).is_ok() {
                return Self::from_secret_bytes(&mut secret_bytes);
            }
            secret_bytes.zeroize();
        }
        Err(SignerError::Other(
            "failed to generate valid keypair after 64 attempts".into(),
        ))
    }

    /// Create a keypair from secret bytes. Zeroes the source.
    pub fn from_secret_bytes(secret: &mut [u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(secret).map_err(|_| SignerError::InvalidNsec)?;
        let public_key = signing_key.verifying_key().to_bytes().into();

        let keypair = Self {
            secret_key: Zeroizing::new(*secret),
            public_key,
        };
        secret.zeroize();
        Ok(keypair)
    }

    /// Create a keypair from an `nsec1…` bech32 string or a 64-char hex key.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidNsec`] if the string does not decode to
    /// exactly 32 valid secret-key bytes.
    pub fn from_nsec(nsec: &str) -> Result<Self> {
        let mut data = if nsec.starts_with("nsec1") {
            let (hrp, data) = bech32::decode(nsec).map_err(|_| SignerError::InvalidNsec)?;
            if hrp.as_str() != "nsec" {
                let mut data = data;
                data.zeroize();
                return Err(SignerError::InvalidNsec);
            }
            data
        } else {
            hex::decode(nsec).map_err(|_| SignerError::InvalidNsec)?
        };

        if data.len() != 32 {
            data.zeroize();
            return Err(SignerError::InvalidNsec);
        }

        let mut secret = [0u8; 32];
        secret.copy_from_slice(&data);
        data.zeroize();
        Self::from_secret_bytes(&mut secret)
    }

    /// Export as a bech32 nsec string.
    pub fn to_nsec(&self) -> Zeroizing<String> {
        Zeroizing::new(
            bech32::encode::<Bech32>(NSEC_HRP, &*self.secret_key)
                .expect("bech32 encode of 32-byte secret with valid HRP is infallible"),
        )
    }

    /// Export as a bech32 npub string.
    pub fn to_npub(&self) -> String {
        bytes_to_npub(&self.public_key)
    }

    /// The public key bytes.
    pub fn public_bytes(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// The public key as lower-case hex.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// Sign a message, returning a 64-byte BIP-340 Schnorr signature.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; 64]> {
        use k256::schnorr::signature::Signer;

        let signing_key =
            SigningKey::from_bytes(&*self.secret_key).map_err(|_| SignerError::InvalidNsec)?;

        let signature = signing_key.sign(message);
        Ok(signature.to_bytes())
    }

    /// ECDH shared secret with an x-only peer key: the x coordinate of
    /// `secret · lift_x(peer)`.
    ///
    /// This is the raw NIP-04/NIP-44 shared secret; callers derive the
    /// conversation key from it where the NIP requires one.
    pub fn shared_secret_x(&self, peer_x_only: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
        let scalar = Option::<Scalar>::from(Scalar::from_repr((*self.secret_key).into()))
            .ok_or(SignerError::InvalidNsec)?;

        let mut compressed = [0u8; 33];
        compressed[0] = 0x02;
        compressed[1..].copy_from_slice(peer_x_only);
        let point = Option::<AffinePoint>::from(AffinePoint::from_bytes((&compressed).into()))
            .ok_or(SignerError::InvalidPubkey)?;

        let shared = (ProjectivePoint::from(point) * scalar).to_affine();

        let mut x = Zeroizing::new([0u8; 32]);
        x.copy_from_slice(shared.x().as_slice());
        Ok(x)
    }
}

impl Clone for NostrKeypair {
    fn clone(&self) -> Self {
        Self {
            secret_key: self.secret_key.clone(),
            public_key: self.public_key,
        }
    }
}

// never prints the secret
impl std::fmt::Debug for NostrKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NostrKeypair")
            .field("npub", &self.to_npub())
            .finish_non_exhaustive()
    }
}

/// Decode an npub to raw x-only bytes.
///
/// # Errors
///
/// Returns [`SignerError::InvalidNpub`] if the string is not a valid npub.
pub fn npub_to_bytes(npub: &str) -> Result<[u8; 32]> {
    let (hrp, data) = bech32::decode(npub).map_err(|_| SignerError::InvalidNpub)?;

    if hrp.as_str() != "npub" || data.len() != 32 {
        return Err(SignerError::InvalidNpub);
    }

    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&data);
    Ok(pubkey)
}

/// Encode raw x-only bytes as an npub.
pub fn bytes_to_npub(pubkey: &[u8; 32]) -> String {
    bech32::encode::<Bech32>(NPUB_HRP, pubkey)
        .expect("bech32 encode of 32-byte pubkey with valid HRP is infallible")
}

/// Convert an npub to its lower-case hex pubkey.
pub fn npub_to_pubkey_hex(npub: &str) -> Result<String> {
    Ok(hex::encode(npub_to_bytes(npub)?))
}

/// Parse an x-only pubkey from hex (case-insensitive).
pub fn parse_x_only_pubkey(pubkey_hex: &str) -> Result<[u8; 32]> {
    let data = hex::decode(pubkey_hex).map_err(|_| SignerError::InvalidPubkey)?;
    if data.len() != 32 {
        return Err(SignerError::InvalidPubkey);
    }
    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&data);
    Ok(pubkey)
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIP-19 reference vectors.
    const VECTOR_NSEC: &str = "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5";
    const VECTOR_SECRET_HEX: &str =
        "67dea2ed018072d675f5415ecfaed7d2597555e202d85b3d65ea4e58d2d92ffa";
    const VECTOR_NPUB: &str = "npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg";
    const VECTOR_PUBKEY_HEX: &str =
        "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";

    #[test]
    fn test_keypair_generation() {
        let kp = NostrKeypair::generate().unwrap();

        assert!(kp.to_nsec().starts_with("nsec1"));
        assert!(kp.to_npub().starts_with("npub1"));
    }

    #[test]
    fn test_nsec_roundtrip() {
        let kp = NostrKeypair::generate().unwrap();
        let nsec = kp.to_nsec();

        let kp2 = NostrKeypair::from_nsec(&nsec).unwrap();

        assert_eq!(kp.public_bytes(), kp2.public_bytes());
    }

    #[test]
    fn test_nip19_vectors() {
        let kp = NostrKeypair::from_nsec(VECTOR_NSEC).unwrap();
        assert_eq!(kp.public_hex(), VECTOR_PUBKEY_HEX);
        assert_eq!(kp.to_npub(), VECTOR_NPUB);
        assert_eq!(&*kp.to_nsec(), VECTOR_NSEC);

        let from_hex = NostrKeypair::from_nsec(VECTOR_SECRET_HEX).unwrap();
        assert_eq!(from_hex.public_bytes(), kp.public_bytes());
    }

    #[test]
    fn test_npub_codec() {
        let bytes = npub_to_bytes(VECTOR_NPUB).unwrap();
        assert_eq!(hex::encode(bytes), VECTOR_PUBKEY_HEX);
        assert_eq!(bytes_to_npub(&bytes), VECTOR_NPUB);
        assert_eq!(npub_to_pubkey_hex(VECTOR_NPUB).unwrap(), VECTOR_PUBKEY_HEX);
    }

    #[test]
    fn test_invalid_nsec() {
        assert!(NostrKeypair::from_nsec("invalid").is_err());
        assert!(NostrKeypair::from_nsec(VECTOR_NPUB).is_err());
        // 31 and 33 byte payloads are rejected
        assert!(NostrKeypair::from_nsec(&"ab".repeat(31)).is_err());
        assert!(NostrKeypair::from_nsec(&"ab".repeat(33)).is_err());
    }

    #[test]
    fn test_sign_verify() {
        use k256::schnorr::signature::Verifier;
        use k256::schnorr::{Signature, VerifyingKey};

        let kp = NostrKeypair::from_nsec(VECTOR_NSEC).unwrap();
        let message = [0x42u8; 32];

        let sig = kp.sign(&message).unwrap();

        let vk = VerifyingKey::from_bytes(kp.public_bytes()).unwrap();
        let sig = Signature::try_from(sig.as_slice()).unwrap();
        assert!(vk.verify(&message, &sig).is_ok());
    }

    #[test]
    fn test_shared_secret_symmetric() {
        let alice = NostrKeypair::generate().unwrap();
        let bob = NostrKeypair::generate().unwrap();

        let ab = alice.shared_secret_x(bob.public_bytes()).unwrap();
        let ba = bob.shared_secret_x(alice.public_bytes()).unwrap();

        assert_eq!(*ab, *ba);
    }

    #[test]
    fn test_shared_secret_bad_peer() {
        let alice = NostrKeypair::generate().unwrap();
        // not an x coordinate on the curve for either lift
        let bad = [0xFFu8; 32];
        assert!(alice.shared_secret_x(&bad).is_err());
    }

    #[test]
    fn test_parse_x_only_pubkey_case_insensitive() {
        let upper = VECTOR_PUBKEY_HEX.to_uppercase();
        assert_eq!(
            parse_x_only_pubkey(&upper).unwrap(),
            parse_x_only_pubkey(VECTOR_PUBKEY_HEX).unwrap()
        );
        assert!(parse_x_only_pubkey("abcd").is_err());
    }
}
