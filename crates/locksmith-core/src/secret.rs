use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Freshness of a secret relative to its explicit expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpirationStatus {
    Valid,
    Expiring,
    Expired,
}

/// A secret value together with its lifetime.
///
/// The value is wiped when the secret is dropped; call [`Secret::zero`] to wipe it
/// earlier. Clones are independent buffers and are wiped independently.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    #[serde(with = "value_b64")]
    value: Vec<u8>,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
    #[zeroize(skip)]
    expires_at: DateTime<Utc>,
}

impl Secret {
    /// New secret created now. An expiry is mandatory.
    pub fn new(value: impl Into<Vec<u8>>, expires_at: DateTime<Utc>) -> Self {
        Self::with_created_at(value, Utc::now(), expires_at)
    }

    pub fn with_created_at(
        value: impl Into<Vec<u8>>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            value: value.into(),
            created_at,
            expires_at,
        }
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Overwrite the value with zeroes and release it.
    pub fn zero(&mut self) {
        self.value.zeroize();
    }

    pub fn metadata(&self) -> SecretMetadata {
        SecretMetadata {
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }

    pub fn status(&self, threshold: Duration) -> ExpirationStatus {
        classify(self.expires_at, threshold)
    }

    /// Signed time left; negative once expired.
    pub fn time_until_expiration(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("value", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Non-sensitive projection of a [`Secret`], used for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SecretMetadata {
    pub fn status(&self, threshold: Duration) -> ExpirationStatus {
        classify(self.expires_at, threshold)
    }

    pub fn time_until_expiration(&self) -> Duration {
        self.expires_at - Utc::now()
    }
}

/// Classify an expiry against the current clock.
pub fn classify(expires_at: DateTime<Utc>, threshold: Duration) -> ExpirationStatus {
    classify_at(Utc::now(), expires_at, threshold)
}

/// Classify an expiry against an explicit `now`.
///
/// `Expiring` is inclusive: a secret expiring in exactly `threshold` is expiring.
pub fn classify_at(
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    threshold: Duration,
) -> ExpirationStatus {
    if now > expires_at {
        return ExpirationStatus::Expired;
    }
    match now.checked_add_signed(threshold) {
        Some(edge) if edge < expires_at => ExpirationStatus::Valid,
        _ => ExpirationStatus::Expiring,
    }
}

mod value_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use zeroize::Zeroize;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let mut encoded = STANDARD.encode(value);
        let result = serializer.serialize_str(&encoded);
        encoded.zeroize();
        result
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let mut encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD.decode(&encoded).map_err(D::Error::custom);
        encoded.zeroize();
        decoded
    }
}
