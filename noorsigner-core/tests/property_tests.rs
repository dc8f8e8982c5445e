#![forbid(unsafe_code)]

use noorsigner_core::crypto::{self, KdfParams};
use noorsigner_core::event;
use noorsigner_core::keys::{bytes_to_npub, npub_to_bytes, NostrKeypair};
use noorsigner_core::{nip04, nip44};
use proptest::prelude::*;

fn keypair_strategy() -> impl Strategy<Value = NostrKeypair> {
    prop::array::uniform32(1u8..255).prop_filter_map("valid secret scalar", |mut bytes| {
        NostrKeypair::from_secret_bytes(&mut bytes).ok()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn custody_encrypt_decrypt_roundtrip(
        password in "[ -~]{8,40}",
        keypair in keypair_strategy()
    ) {
        let nsec = keypair.to_nsec();
        let encrypted =
            crypto::encrypt_nsec(&nsec, password.as_bytes(), KdfParams::TESTING).unwrap();
        let reparsed = crypto::EncryptedKey::parse(&encrypted.encode()).unwrap();
        let decrypted =
            crypto::decrypt_nsec(&reparsed, password.as_bytes(), KdfParams::TESTING).unwrap();
        prop_assert_eq!(&*decrypted, &*nsec);
    }

    #[test]
    fn npub_derivation_deterministic(keypair in keypair_strategy()) {
        let npub = keypair.to_npub();
        prop_assert_eq!(keypair.to_npub(), npub.clone());

        let decoded = npub_to_bytes(&npub).unwrap();
        prop_assert_eq!(&decoded, keypair.public_bytes());
        prop_assert_eq!(bytes_to_npub(&decoded), npub);
    }

    #[test]
    fn nsec_reimport_preserves_identity(keypair in keypair_strategy()) {
        let restored = NostrKeypair::from_nsec(&keypair.to_nsec()).unwrap();
        prop_assert_eq!(restored.public_bytes(), keypair.public_bytes());
    }

    #[test]
    fn nip44_roundtrip(
        alice in keypair_strategy(),
        bob in keypair_strategy(),
        message in "[ -~]{1,512}"
    ) {
        let sender_key =
            nip44::conversation_key(&alice.shared_secret_x(bob.public_bytes()).unwrap());
        let receiver_key =
            nip44::conversation_key(&bob.shared_secret_x(alice.public_bytes()).unwrap());

        let payload = nip44::encrypt(&message, &sender_key).unwrap();
        let decrypted = nip44::decrypt(&payload, &receiver_key).unwrap();
        prop_assert_eq!(&*decrypted, &message);
    }

    #[test]
    fn nip04_roundtrip(
        alice in keypair_strategy(),
        bob in keypair_strategy(),
        message in "[ -~]{0,256}"
    ) {
        let sender_shared = alice.shared_secret_x(bob.public_bytes()).unwrap();
        let receiver_shared = bob.shared_secret_x(alice.public_bytes()).unwrap();

        let payload = nip04::encrypt(&message, &sender_shared).unwrap();
        let decrypted = nip04::decrypt(&payload, &receiver_shared).unwrap();
        prop_assert_eq!(&*decrypted, &message);
    }

    #[test]
    fn canonical_json_never_escapes_html(content in "[ -~]{0,128}") {
        let event_json = serde_json::json!({
            "pubkey": "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e",
            "created_at": 1_700_000_000i64,
            "kind": 1,
            "tags": [],
            "content": format!("<{content}>&"),
        })
        .to_string();

        let canonical = event::canonical_serialization(&event_json).unwrap();
        prop_assert!(!canonical.contains("\\u003c"));
        prop_assert!(!canonical.contains("\\u003e"));
        prop_assert!(!canonical.contains("\\u0026"));
    }

    #[test]
    fn signatures_verify(keypair in keypair_strategy(), message in prop::array::uniform32(any::<u8>())) {
        use k256::schnorr::signature::Verifier;
        use k256::schnorr::{Signature, VerifyingKey};

        let sig = keypair.sign(&message).unwrap();
        let vk = VerifyingKey::from_bytes(keypair.public_bytes()).unwrap();
        let sig = Signature::try_from(sig.as_slice()).unwrap();
        prop_assert!(vk.verify(&message, &sig).is_ok());
    }
}
