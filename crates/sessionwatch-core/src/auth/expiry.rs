//! Credential expiry and wall-clock access.

use chrono::{DateTime, Utc};

use super::codec::{self, Credential, DecodeError};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock driven by tokio's clock.
///
/// Starts at `origin` and moves forward with `tokio::time::Instant`, so a
/// runtime with paused time (`tokio::time::pause`, `start_paused = true`)
/// advances wall time and armed timers together.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl VirtualClock {
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().duration_since(self.started);
        let elapsed =
            chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        self.origin + elapsed
    }
}

/// Absolute expiration instant of a credential (`exp` seconds, millisecond precision).
pub fn expiry_instant(credential: &Credential) -> Result<DateTime<Utc>, DecodeError> {
    let payload = codec::decode(credential)?;
    DateTime::from_timestamp_millis(payload.exp.saturating_mul(1000))
        .ok_or(DecodeError::ExpiryOutOfRange(payload.exp))
}

/// Whether the credential is expired at `now`.
///
/// Fails closed: a credential that cannot be decoded counts as expired.
pub fn is_expired(credential: &Credential, now: DateTime<Utc>) -> bool {
    match expiry_instant(credential) {
        Ok(expires_at) => expires_at <= now,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::tests::credential_with_payload;
    use chrono::Duration;

    fn credential_expiring_at(exp: i64) -> Credential {
        credential_with_payload(&serde_json::json!({ "sub": "1", "exp": exp }))
    }

    #[test]
    fn test_expiry_instant_is_exp_in_millis() {
        let credential = credential_expiring_at(1_700_000_000);
        let expires_at = expiry_instant(&credential).expect("decodable");
        assert_eq!(expires_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_is_expired_past_and_boundary() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp");

        assert!(is_expired(&credential_expiring_at(1_699_999_999), now));
        // Expiry exactly at `now` is already expired
        assert!(is_expired(&credential_expiring_at(1_700_000_000), now));
        assert!(!is_expired(&credential_expiring_at(1_700_000_001), now));
    }

    #[test]
    fn test_is_expired_fails_closed_on_malformed() {
        let now = Utc::now();
        assert!(is_expired(&Credential::new("garbage"), now));
        assert!(is_expired(&Credential::new("a.b.c"), now));
    }

    #[test]
    fn test_expiry_out_of_range() {
        let credential = credential_expiring_at(i64::MAX);
        assert!(matches!(
            expiry_instant(&credential),
            Err(DecodeError::ExpiryOutOfRange(i64::MAX))
        ));
        assert!(is_expired(&credential, Utc::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_virtual_clock_follows_tokio_time() {
        let origin = DateTime::from_timestamp(1_000, 0).expect("valid timestamp");
        let clock = VirtualClock::new(origin);
        assert_eq!(clock.now(), origin);

        tokio::time::advance(std::time::Duration::from_secs(90)).await;
        assert_eq!(clock.now(), origin + Duration::seconds(90));
    }

    #[test]
    fn test_system_clock_is_close_to_now() {
        let delta = SystemClock.now() - Utc::now();
        assert!(delta.num_seconds().abs() <= 1);
    }
}
