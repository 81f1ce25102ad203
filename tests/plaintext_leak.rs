/// Plaintext leak detection tests.
///
/// Verify that envelopes never contain the sealed payload, the excluded `blob`
/// field, or the passphrase in any readable form: neither as raw text nor as
/// a base64url-encoded string.
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::json;

use ledgerlock::credentials::CredentialContext;
use ledgerlock::envelope::EnvelopeCodec;
use ledgerlock::storage::MemoryStorage;

const PASSPHRASE: &str = "PASSPHRASE-MUST-NOT-APPEAR-123";
const KNOWN_NOTE: &str = "KNOWN-NOTE-abc123-MUST-NOT-APPEAR";
const KNOWN_BLOB: &str = "KNOWN-BLOB-xyz789-MUST-NOT-APPEAR";

fn codec() -> EnvelopeCodec {
    let credentials = Arc::new(CredentialContext::new(Arc::new(MemoryStorage::new())));
    credentials.set_cipher(PASSPHRASE).expect("set cipher");
    EnvelopeCodec::new(credentials)
}

fn seal_known() -> String {
    codec()
        .encrypt(&json!({"note": KNOWN_NOTE, "blob": KNOWN_BLOB}))
        .expect("encrypt")
        .expect("sealed")
}

fn decoded_segments(envelope: &str) -> Vec<Vec<u8>> {
    envelope
        .split('.')
        .map(|segment| URL_SAFE_NO_PAD.decode(segment).expect("base64url segment"))
        .collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn test_envelope_contains_no_plaintext() {
    let envelope = seal_known();
    for needle in [KNOWN_NOTE, KNOWN_BLOB, PASSPHRASE] {
        assert!(
            !envelope.contains(needle),
            "envelope text must not contain {needle}"
        );
        let encoded = URL_SAFE_NO_PAD.encode(needle);
        assert!(
            !envelope.contains(&encoded),
            "envelope must not contain base64url of {needle}"
        );
    }
}

#[test]
fn test_decoded_segments_contain_no_plaintext() {
    let envelope = seal_known();
    for segment in decoded_segments(&envelope) {
        for needle in [KNOWN_NOTE, KNOWN_BLOB, PASSPHRASE] {
            assert!(
                !contains(&segment, needle.as_bytes()),
                "decoded segment must not contain {needle}"
            );
        }
    }
}

#[test]
fn test_header_is_the_only_readable_segment() {
    let envelope = seal_known();
    let segments = decoded_segments(&envelope);
    let header: serde_json::Value = serde_json::from_slice(&segments[0]).expect("header json");
    assert_eq!(
        header,
        json!({"alg": "A256KW", "enc": "A128CBC-HS256", "cty": "json"})
    );
    for segment in &segments[1..] {
        assert!(serde_json::from_slice::<serde_json::Value>(segment).is_err());
    }
}

#[test]
fn test_same_payload_seals_differently_each_time() {
    let codec = codec();
    let payload = json!({"note": KNOWN_NOTE});
    let first = codec.encrypt(&payload).expect("encrypt").expect("sealed");
    let second = codec.encrypt(&payload).expect("encrypt").expect("sealed");
    assert_ne!(first, second);
}
