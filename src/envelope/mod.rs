//! Envelope module: compact JWE sealing of JSON payloads under the derived key.
//!
//! Wire format (RFC 7516 compact serialization, five base64url segments):
//!
//! ```text
//! b64u(protected header) . b64u(wrapped CEK) . b64u(IV) . b64u(ciphertext) . b64u(tag)
//! ```
//!
//! The protected header is always `{"alg":"A256KW","enc":"A128CBC-HS256","cty":"json"}`.
//! A fresh 32-byte content key is generated per message and wrapped with
//! AES-KW under the derived key. Content is AES-128-CBC with PKCS#7 padding,
//! authenticated by a truncated HMAC-SHA-256 over AAD, IV, ciphertext and the
//! AAD bit length (RFC 7518 §5.2.2).

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::credentials::CredentialContext;
use crate::crypto::DerivedKey;
use crate::error::ClientError;

/// JWE key-management algorithm.
pub const KEY_WRAP_ALG: &str = "A256KW";

/// JWE content-encryption algorithm.
pub const CONTENT_ENC: &str = "A128CBC-HS256";

/// JWE content type of the plaintext.
pub const CONTENT_TYPE: &str = "json";

/// Payload field that is never encrypted.
pub const EXCLUDED_FIELD: &str = "blob";

const CEK_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProtectedHeader {
    pub alg: String,
    pub enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
}

impl Default for ProtectedHeader {
    fn default() -> Self {
        Self {
            alg: KEY_WRAP_ALG.to_string(),
            enc: CONTENT_ENC.to_string(),
            cty: Some(CONTENT_TYPE.to_string()),
        }
    }
}

fn random_bytes<const N: usize>() -> Result<Zeroizing<[u8; N]>, ClientError> {
    let mut buf = Zeroizing::new([0u8; N]);
    OsRng
        .try_fill_bytes(&mut buf[..])
        .map_err(|e| ClientError::CryptoUnavailable(format!("system RNG failed: {e}")))?;
    Ok(buf)
}

/// HMAC-SHA-256 over `aad || iv || ciphertext || AL`, before truncation.
fn content_mac(
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<HmacSha256, ClientError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| ClientError::CryptoUnavailable(format!("hmac init failed: {e}")))?;
    let aad_bits = (aad.len() as u64) * 8;
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&aad_bits.to_be_bytes());
    Ok(mac)
}

/// Encrypt raw plaintext bytes into a compact envelope.
pub fn seal(plaintext: &[u8], key: &DerivedKey) -> Result<String, ClientError> {
    let header = serde_json::to_vec(&ProtectedHeader::default())?;
    let encoded_header = URL_SAFE_NO_PAD.encode(header);

    let cek = random_bytes::<CEK_LEN>()?;
    let iv = random_bytes::<IV_LEN>()?;
    let (mac_key, enc_key) = cek.split_at(CEK_LEN / 2);

    let wrapped_cek = key
        .key_wrap()
        .wrap_vec(&cek[..])
        .map_err(|e| ClientError::CryptoUnavailable(format!("key wrap failed: {e}")))?;

    let ciphertext = Aes128CbcEnc::new_from_slices(enc_key, &iv[..])
        .map_err(|e| ClientError::CryptoUnavailable(format!("cipher init failed: {e}")))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let full_tag = content_mac(mac_key, encoded_header.as_bytes(), &iv[..], &ciphertext)?
        .finalize()
        .into_bytes();

    Ok([
        encoded_header,
        URL_SAFE_NO_PAD.encode(wrapped_cek),
        URL_SAFE_NO_PAD.encode(&iv[..]),
        URL_SAFE_NO_PAD.encode(&ciphertext),
        URL_SAFE_NO_PAD.encode(&full_tag[..TAG_LEN]),
    ]
    .join("."))
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, ClientError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ClientError::DecryptionFailure(format!("invalid {name} encoding: {e}")))
}

/// Decrypt and authenticate a compact envelope, returning the plaintext bytes.
///
/// The tag is verified before any ciphertext is decrypted.
pub fn open(envelope: &str, key: &DerivedKey) -> Result<Vec<u8>, ClientError> {
    let segments: Vec<&str> = envelope.trim().split('.').collect();
    let [encoded_header, wrapped_cek, iv, ciphertext, tag] = segments[..] else {
        return Err(ClientError::DecryptionFailure(format!(
            "expected 5 envelope segments, found {}",
            segments.len()
        )));
    };

    let header: ProtectedHeader =
        serde_json::from_slice(&decode_segment(encoded_header, "header")?).map_err(|e| {
            ClientError::DecryptionFailure(format!("invalid protected header: {e}"))
        })?;
    if header.alg != KEY_WRAP_ALG || header.enc != CONTENT_ENC {
        return Err(ClientError::DecryptionFailure(format!(
            "unsupported algorithms alg={} enc={}",
            header.alg, header.enc
        )));
    }

    let wrapped_cek = decode_segment(wrapped_cek, "encrypted key")?;
    let iv = decode_segment(iv, "iv")?;
    let ciphertext = decode_segment(ciphertext, "ciphertext")?;
    let tag = decode_segment(tag, "tag")?;

    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(ClientError::DecryptionFailure(
            "malformed iv or tag length".to_string(),
        ));
    }

    let cek = Zeroizing::new(key.key_wrap().unwrap_vec(&wrapped_cek).map_err(|_| {
        ClientError::DecryptionFailure("content key unwrap failed (wrong cipher?)".to_string())
    })?);
    if cek.len() != CEK_LEN {
        return Err(ClientError::DecryptionFailure(format!(
            "content key has wrong length {}",
            cek.len()
        )));
    }
    let (mac_key, enc_key) = cek.split_at(CEK_LEN / 2);

    content_mac(mac_key, encoded_header.as_bytes(), &iv, &ciphertext)?
        .verify_truncated_left(&tag)
        .map_err(|_| ClientError::DecryptionFailure("integrity tag mismatch".to_string()))?;

    Aes128CbcDec::new_from_slices(enc_key, &iv)
        .map_err(|e| ClientError::CryptoUnavailable(format!("cipher init failed: {e}")))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| ClientError::DecryptionFailure("invalid padding".to_string()))
}

/// Deep copy of `payload` with the top-level `blob` field removed.
/// `null` becomes an empty object.
pub fn sanitize_payload(payload: Value) -> Value {
    match payload {
        Value::Null => Value::Object(Default::default()),
        Value::Object(mut map) => {
            map.remove(EXCLUDED_FIELD);
            Value::Object(map)
        }
        other => other,
    }
}

/// Encrypts and decrypts payloads with the context's current derived key.
///
/// When no cipher is configured, `encrypt` returns `Ok(None)` and callers send
/// the payload in the clear. That is intended: encryption is opt-in per user.
#[derive(Clone)]
pub struct EnvelopeCodec {
    credentials: Arc<CredentialContext>,
}

impl EnvelopeCodec {
    pub fn new(credentials: Arc<CredentialContext>) -> Self {
        Self { credentials }
    }

    pub fn encrypt<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Option<String>, ClientError> {
        let Some(key) = self.credentials.derived_key()? else {
            return Ok(None);
        };
        let sanitized = sanitize_payload(serde_json::to_value(payload)?);
        let plaintext = Zeroizing::new(serde_json::to_vec(&sanitized)?);
        seal(&plaintext, &key).map(Some)
    }

    pub fn decrypt(&self, envelope: Option<&str>) -> Result<Option<Value>, ClientError> {
        self.decrypt_as(envelope)
    }

    /// Decrypt into a concrete type.
    pub fn decrypt_as<T: DeserializeOwned>(
        &self,
        envelope: Option<&str>,
    ) -> Result<Option<T>, ClientError> {
        let Some(key) = self.credentials.derived_key()? else {
            return Ok(None);
        };
        let Some(envelope) = envelope else {
            return Ok(None);
        };
        let plaintext = Zeroizing::new(open(envelope, &key)?);
        serde_json::from_slice(&plaintext).map(Some).map_err(|e| {
            ClientError::DecryptionFailure(format!("plaintext is not valid JSON: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyDerivation, Sha256Derivation};
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn key(secret: &str) -> DerivedKey {
        Sha256Derivation.derive(secret).expect("derive")
    }

    fn codec_with(cipher: Option<&str>) -> EnvelopeCodec {
        let ctx = Arc::new(CredentialContext::new(Arc::new(MemoryStorage::new())));
        if let Some(cipher) = cipher {
            ctx.set_cipher(cipher).expect("set cipher");
        }
        EnvelopeCodec::new(ctx)
    }

    #[test]
    fn seal_open_round_trip() {
        let k = key("correct-horse");
        let envelope = seal(b"{\"amount\":42}", &k).expect("seal");
        let plaintext = open(&envelope, &k).expect("open");
        assert_eq!(plaintext, b"{\"amount\":42}");
    }

    #[test]
    fn envelope_has_five_segments_and_fixed_header() {
        let envelope = seal(b"{}", &key("correct-horse")).expect("seal");
        let segments: Vec<&str> = envelope.split('.').collect();
        assert_eq!(segments.len(), 5);

        let header: Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[0]).expect("b64"))
                .expect("header json");
        assert_eq!(
            header,
            json!({"alg": "A256KW", "enc": "A128CBC-HS256", "cty": "json"})
        );
        // 32-byte CEK wrapped with AES-KW is 40 bytes.
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[1]).expect("b64").len(), 40);
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[2]).expect("b64").len(), IV_LEN);
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[4]).expect("b64").len(), TAG_LEN);
    }

    #[test]
    fn sealing_twice_differs() {
        let k = key("correct-horse");
        let a = seal(b"same", &k).expect("seal");
        let b = seal(b"same", &k).expect("seal");
        assert_ne!(a, b, "fresh CEK and IV per message");
    }

    #[test]
    fn wrong_key_fails() {
        let envelope = seal(b"{}", &key("correct-horse")).expect("seal");
        let err = open(&envelope, &key("wrong-horse")).unwrap_err();
        assert!(matches!(err, ClientError::DecryptionFailure(_)), "got {err:?}");
    }

    #[test]
    fn tampered_ciphertext_fails_integrity_check() {
        let k = key("correct-horse");
        let envelope = seal(b"{\"note\":\"lunch\"}", &k).expect("seal");
        let mut segments: Vec<String> = envelope.split('.').map(str::to_string).collect();
        let mut ct = URL_SAFE_NO_PAD.decode(&segments[3]).expect("b64");
        ct[0] ^= 0x01;
        segments[3] = URL_SAFE_NO_PAD.encode(&ct);

        let err = open(&segments.join("."), &k).unwrap_err();
        assert!(
            matches!(err, ClientError::DecryptionFailure(ref msg) if msg.contains("integrity")),
            "got {err:?}"
        );
    }

    #[test]
    fn tampered_header_fails_integrity_check() {
        let k = key("correct-horse");
        let envelope = seal(b"{}", &k).expect("seal");
        let mut segments: Vec<String> = envelope.split('.').map(str::to_string).collect();
        segments[0] = URL_SAFE_NO_PAD.encode(br#"{"alg":"A256KW","enc":"A128CBC-HS256"}"#);
        assert!(matches!(
            open(&segments.join("."), &k),
            Err(ClientError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn unsupported_algorithm_rejected() {
        let k = key("correct-horse");
        let envelope = seal(b"{}", &k).expect("seal");
        let mut segments: Vec<String> = envelope.split('.').map(str::to_string).collect();
        segments[0] = URL_SAFE_NO_PAD.encode(br#"{"alg":"dir","enc":"A256GCM"}"#);
        let err = open(&segments.join("."), &k).unwrap_err();
        assert!(matches!(err, ClientError::DecryptionFailure(ref msg) if msg.contains("unsupported")));
    }

    #[test]
    fn malformed_envelopes_fail_without_panicking() {
        let k = key("correct-horse");
        for bad in ["", "a.b.c", "a.b.c.d.e", "!!!.!!!.!!!.!!!.!!!", "a.b.c.d.e.f"] {
            assert!(
                matches!(open(bad, &k), Err(ClientError::DecryptionFailure(_))),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn sanitize_strips_blob_only_at_top_level() {
        let payload = json!({"amount": 1, "blob": "raw", "nested": {"blob": "kept"}});
        assert_eq!(
            sanitize_payload(payload),
            json!({"amount": 1, "nested": {"blob": "kept"}})
        );
        assert_eq!(sanitize_payload(Value::Null), json!({}));
        assert_eq!(sanitize_payload(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn codec_without_cipher_is_passthrough() {
        let codec = codec_with(None);
        assert_eq!(codec.encrypt(&json!({"amount": 42})).expect("encrypt"), None);
        assert_eq!(codec.decrypt(Some("a.b.c.d.e")).expect("decrypt"), None);
    }

    #[test]
    fn codec_absent_envelope_yields_none() {
        let codec = codec_with(Some("correct-horse"));
        assert_eq!(codec.decrypt(None).expect("decrypt"), None);
    }

    #[test]
    fn codec_round_trip_drops_blob() {
        let codec = codec_with(Some("correct-horse"));
        let envelope = codec
            .encrypt(&json!({"amount": 42, "note": "lunch", "blob": "raw-bytes"}))
            .expect("encrypt")
            .expect("envelope");
        let decrypted = codec.decrypt(Some(envelope.as_str())).expect("decrypt");
        assert_eq!(decrypted, Some(json!({"amount": 42, "note": "lunch"})));
    }

    #[test]
    fn codec_decrypt_as_typed() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Expense {
            amount: f64,
            name: String,
        }

        let codec = codec_with(Some("correct-horse"));
        let expense = Expense {
            amount: 12.5,
            name: "Coffee".to_string(),
        };
        let envelope = codec.encrypt(&expense).expect("encrypt").expect("envelope");
        let back: Option<Expense> = codec.decrypt_as(Some(envelope.as_str())).expect("decrypt");
        assert_eq!(back, Some(expense));
    }

    #[test]
    fn codec_detects_cipher_rotation() {
        let ctx = Arc::new(CredentialContext::new(Arc::new(MemoryStorage::new())));
        let codec = EnvelopeCodec::new(Arc::clone(&ctx));
        ctx.set_cipher("correct-horse").expect("set");
        let envelope = codec.encrypt(&json!({"amount": 42})).expect("encrypt").expect("envelope");

        ctx.set_cipher("wrong-horse").expect("rotate");
        let err = codec.decrypt(Some(envelope.as_str())).unwrap_err();
        assert!(matches!(err, ClientError::DecryptionFailure(_)), "got {err:?}");
    }
}
