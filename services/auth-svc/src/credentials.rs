use std::sync::Arc;

use tokio::sync::Mutex;

/// The single username/secret pair the service accepts, fixed at startup.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub username: String,
    pub secret: String,
}

/// Signed-in state for the one supported identity.
///
/// The flag only ever moves from `false` to `true`. There is no sign-out
/// and no expiry, so a successful verification is visible to every later
/// session query for the lifetime of the process.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    record: CredentialRecord,
    signed_in: Mutex<bool>,
}

impl SessionStore {
    pub fn new(record: CredentialRecord) -> Self {
        Self {
            inner: Arc::new(Inner {
                record,
                signed_in: Mutex::new(false),
            }),
        }
    }

    /// Check a complete submission body against the stored record.
    ///
    /// The body must already be fully received; callers must not hand over
    /// a partial stream. A match sets the session flag. A mismatch leaves
    /// it untouched, so a failed attempt can never revoke an earlier
    /// successful one.
    pub async fn verify(&self, body: &[u8]) -> bool {
        let body = String::from_utf8_lossy(body);
        let values = decode_pair_values(&body);
        let matched = values.first().copied().flatten()
            == Some(self.inner.record.username.as_str())
            && values.get(1).copied().flatten() == Some(self.inner.record.secret.as_str());

        if matched {
            let mut signed_in = self.inner.signed_in.lock().await;
            *signed_in = true;
        }

        matched
    }

    pub async fn signed_in(&self) -> bool {
        *self.inner.signed_in.lock().await
    }
}

/// Split a `key=value&key=value` body into its values, in submission order.
///
/// Extraction is positional: key names are ignored, the first value is
/// matched against the username slot and the second against the secret
/// slot. A pair with no `=` yields no value; a pair with several takes the
/// segment after the first one. This mirrors the sign-in form's field
/// order and is deliberately not a keyed lookup, so a body that reorders
/// its pairs is checked against the wrong slots.
pub fn decode_pair_values(body: &str) -> Vec<Option<&str>> {
    body.split('&').map(|pair| pair.split('=').nth(1)).collect()
}
