//! Signed cookie encoding for session values.
//!
//! ```text
//! base64url(json({"v": values, "t": issued_at})) "." base64url(hmac_sha256(secret, payload))
//! ```
//!
//! The signature covers the encoded payload. Anything that fails to verify,
//! parse, or (with a max age configured) is older than the max age decodes to
//! `None`; callers treat that as "no session".

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "v")]
    values: Map<String, Value>,
    #[serde(rename = "t")]
    issued_at: u64,
}

pub(crate) struct Codec {
    mac: HmacSha256,
    max_age: Option<Duration>,
}

impl Codec {
    pub(crate) fn new(secret: &[u8], max_age: Option<Duration>) -> Self {
        let mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
        Self { mac, max_age }
    }

    /// Serializes and signs `values`; `now` is seconds since the Unix epoch.
    pub(crate) fn encode(&self, values: &Map<String, Value>, now: u64) -> Result<String, serde_json::Error> {
        let envelope = Envelope { values: values.clone(), issued_at: now };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&envelope)?);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&payload).finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    pub(crate) fn decode(&self, cookie: &str, now: u64) -> Option<Map<String, Value>> {
        let (payload, signature) = cookie.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        self.sign(payload).verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let envelope: Envelope = serde_json::from_slice(&json).ok()?;

        if let Some(max_age) = self.max_age {
            if now.saturating_sub(envelope.issued_at) > max_age.as_secs() {
                return None;
            }
        }
        Some(envelope.values)
    }

    fn sign(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn values() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("greet".into(), json!("Hello, World!"));
        m.insert("visits".into(), json!(3));
        m
    }

    #[test]
    fn decodes_what_it_encodes() {
        let codec = Codec::new(b"secret", None);
        let cookie = codec.encode(&values(), 100).unwrap();
        assert_eq!(codec.decode(&cookie, 100), Some(values()));
    }

    #[test]
    fn rejects_other_secret() {
        let cookie = Codec::new(b"secret", None).encode(&values(), 100).unwrap();
        assert_eq!(Codec::new(b"other", None).decode(&cookie, 100), None);
    }

    #[test]
    fn rejects_tampered_payload() {
        let codec = Codec::new(b"secret", None);
        let cookie = codec.encode(&values(), 100).unwrap();
        let (_, signature) = cookie.split_once('.').unwrap();

        let mut forged = values();
        forged.insert("admin".into(), json!(true));
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Envelope { values: forged, issued_at: 100 }).unwrap(),
        );
        assert_eq!(codec.decode(&format!("{payload}.{signature}"), 100), None);
    }

    #[test]
    fn rejects_garbage() {
        let codec = Codec::new(b"secret", None);
        for cookie in ["", "no-dot", "a.b", "%%%.###", "."] {
            assert_eq!(codec.decode(cookie, 0), None, "cookie {cookie:?}");
        }
    }

    #[test]
    fn expires_after_max_age() {
        let codec = Codec::new(b"secret", Some(Duration::from_secs(60)));
        let cookie = codec.encode(&values(), 1_000).unwrap();
        assert!(codec.decode(&cookie, 1_060).is_some());
        assert_eq!(codec.decode(&cookie, 1_061), None);
    }
}
