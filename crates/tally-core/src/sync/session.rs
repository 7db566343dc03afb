//! Pairing session lifecycle
//!
//! At most one session exists at a time; that is a security boundary, not
//! an optimization — only one PIN may ever be valid on screen. All state
//! transitions go through one mutex, so an expiry firing from the timer
//! cannot interleave with an in-flight `authenticate` or ingest.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::SyncSession;
use crate::util::now_ms;

/// Session state machine phases
///
/// `Idle → Listening (start) → Paired (authenticate) → Closed (stop,
/// expiry, or completed ingest)`. Only a fresh `start` leaves `Closed`,
/// and it creates a brand-new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Listening,
    Paired,
    Closed,
}

#[derive(Debug, Default)]
struct SessionSlot {
    phase: SessionPhase,
    session: Option<SyncSession>,
    port: u16,
    ingested: bool,
}

impl SessionSlot {
    /// Close the session if its deadline has passed; safe to call anywhere
    fn expire_if_due(&mut self, now: u64) {
        if matches!(self.phase, SessionPhase::Listening | SessionPhase::Paired) {
            if let Some(session) = &mut self.session {
                if now >= session.expires_at {
                    tracing::info!(pin = %session.pin, "Pairing session expired");
                    session.is_active = false;
                    self.phase = SessionPhase::Closed;
                }
            }
        }
    }
}

/// Owns the single pairing session and its guarded state machine
pub struct PairingSessionManager {
    inner: Mutex<SessionSlot>,
    ttl_ms: u64,
}

impl PairingSessionManager {
    #[must_use]
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(SessionSlot::default()),
            ttl_ms: session_ttl.as_secs() * 1_000,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Open a new pairing session; fails while another is still live
    pub fn start(&self, port: u16) -> Result<SyncSession> {
        self.start_at(port, now_ms())
    }

    pub(crate) fn start_at(&self, port: u16, now: u64) -> Result<SyncSession> {
        let mut slot = self.lock();
        slot.expire_if_due(now);

        if matches!(slot.phase, SessionPhase::Listening | SessionPhase::Paired) {
            return Err(Error::AlreadyActive);
        }

        let session = SyncSession {
            pin: generate_pin(),
            token: None,
            created_at: now,
            expires_at: now + self.ttl_ms,
            is_active: true,
            device_name: None,
        };
        tracing::info!(pin = %session.pin, port, "Pairing session opened");

        slot.phase = SessionPhase::Listening;
        slot.port = port;
        slot.ingested = false;
        slot.session = Some(session.clone());
        Ok(session)
    }

    /// Exchange the on-screen PIN for a sync token
    ///
    /// Returns the token and the seconds left until session expiry. A
    /// session accepts exactly one pairing; later attempts are rejected.
    pub fn authenticate(&self, pin: &str, device_name: &str) -> Result<(String, u64)> {
        self.authenticate_at(pin, device_name, now_ms())
    }

    pub(crate) fn authenticate_at(
        &self,
        pin: &str,
        device_name: &str,
        now: u64,
    ) -> Result<(String, u64)> {
        let mut slot = self.lock();
        slot.expire_if_due(now);

        match slot.phase {
            SessionPhase::Listening => {
                let Some(session) = &mut slot.session else {
                    return Err(Error::InvalidPin);
                };
                if session.pin != pin {
                    return Err(Error::InvalidPin);
                }

                let token = generate_token(&session.pin, now);
                session.token = Some(token.clone());
                session.device_name = Some(device_name.to_string());
                let expires_in = (session.expires_at.saturating_sub(now)) / 1_000;
                tracing::info!(device = device_name, "Remote device paired");

                slot.phase = SessionPhase::Paired;
                Ok((token, expires_in))
            }
            SessionPhase::Paired => Err(Error::Unauthorized(
                "pairing session already paired to a device".to_string(),
            )),
            SessionPhase::Idle | SessionPhase::Closed => {
                // An expired (or stopped) session with a matching PIN gets
                // the terminal restart-the-pairing message
                match &slot.session {
                    Some(session) if session.pin == pin => Err(Error::Expired),
                    _ => Err(Error::InvalidPin),
                }
            }
        }
    }

    /// Validate a token for ingest without consuming the session
    pub(crate) fn begin_ingest(&self, token: &str) -> Result<SyncSession> {
        self.begin_ingest_at(token, now_ms())
    }

    pub(crate) fn begin_ingest_at(&self, token: &str, now: u64) -> Result<SyncSession> {
        let mut slot = self.lock();
        slot.expire_if_due(now);

        let token_matches = slot
            .session
            .as_ref()
            .and_then(|session| session.token.as_deref())
            .is_some_and(|issued| issued == token);

        match slot.phase {
            SessionPhase::Paired if token_matches => slot
                .session
                .clone()
                .ok_or_else(|| Error::Unauthorized("unknown sync token".to_string())),
            SessionPhase::Closed if token_matches && slot.ingested => Err(Error::AlreadyIngested),
            SessionPhase::Closed if token_matches => Err(Error::Unauthorized(
                "pairing session expired before the payload arrived".to_string(),
            )),
            _ => Err(Error::Unauthorized("unknown sync token".to_string())),
        }
    }

    /// Mark the single payload submission as consumed and close the session
    pub(crate) fn complete_ingest(&self, token: &str) {
        let mut slot = self.lock();
        let token_matches = slot
            .session
            .as_ref()
            .and_then(|session| session.token.as_deref())
            .is_some_and(|issued| issued == token);

        if slot.phase == SessionPhase::Paired && token_matches {
            if let Some(session) = &mut slot.session {
                session.is_active = false;
            }
            slot.ingested = true;
            slot.phase = SessionPhase::Closed;
            tracing::info!("Sync payload consumed, session closed");
        }
    }

    /// Milliseconds until expiry; 0 once expired or closed
    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms_at(now_ms())
    }

    pub(crate) fn remaining_ms_at(&self, now: u64) -> u64 {
        let mut slot = self.lock();
        slot.expire_if_due(now);

        if matches!(slot.phase, SessionPhase::Listening | SessionPhase::Paired) {
            slot.session
                .as_ref()
                .map_or(0, |session| session.expires_at.saturating_sub(now))
        } else {
            0
        }
    }

    /// Explicit early close; idempotent
    pub fn stop(&self) {
        let mut slot = self.lock();
        if matches!(slot.phase, SessionPhase::Listening | SessionPhase::Paired) {
            if let Some(session) = &mut slot.session {
                session.is_active = false;
            }
            slot.phase = SessionPhase::Closed;
            tracing::info!("Pairing session stopped");
        }
    }

    /// Whether a session is currently live (listening or paired)
    pub fn is_active(&self) -> bool {
        let mut slot = self.lock();
        slot.expire_if_due(now_ms());
        matches!(slot.phase, SessionPhase::Listening | SessionPhase::Paired)
    }

    /// Port requested for the current (or last) session
    pub fn port(&self) -> u16 {
        self.lock().port
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> SessionPhase {
        self.lock().phase
    }
}

/// Six-digit numeric PIN; human-enterable, collision-resistant enough for
/// a 15-minute single-use window
fn generate_pin() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(100_000..=999_999))
}

/// Opaque token bound to one session: sha256 over pin, time, and a nonce
fn generate_token(pin: &str, now: u64) -> String {
    let data = format!("{pin}-{now}-{}", Uuid::new_v4());
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const TTL: Duration = Duration::from_secs(900);

    fn manager() -> PairingSessionManager {
        PairingSessionManager::new(TTL)
    }

    #[test]
    fn test_pin_is_six_digits() {
        let manager = manager();
        let session = manager.start_at(8080, 1_000).unwrap();
        assert_eq!(session.pin.len(), 6);
        assert!(session.pin.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(session.expires_at - session.created_at, 900_000);
    }

    #[test]
    fn test_second_start_rejected_while_live() {
        let manager = manager();
        manager.start_at(8080, 1_000).unwrap();
        let err = manager.start_at(8080, 2_000).unwrap_err();
        assert!(matches!(err, Error::AlreadyActive));
    }

    #[test]
    fn test_start_allowed_after_expiry() {
        let manager = manager();
        manager.start_at(8080, 1_000).unwrap();
        let session = manager.start_at(8080, 1_000 + 900_000).unwrap();
        assert!(session.is_active);
    }

    #[test]
    fn test_authenticate_issues_token() {
        let manager = manager();
        let session = manager.start_at(8080, 1_000).unwrap();

        let (token, expires_in) = manager
            .authenticate_at(&session.pin, "phone", 61_000)
            .unwrap();
        assert_eq!(token.len(), 64);
        assert_eq!(expires_in, 840);
        assert_eq!(manager.phase(), SessionPhase::Paired);
    }

    #[test]
    fn test_authenticate_rejects_wrong_pin() {
        let manager = manager();
        manager.start_at(8080, 1_000).unwrap();
        let err = manager.authenticate_at("000000", "phone", 2_000).unwrap_err();
        assert!(matches!(err, Error::InvalidPin));
    }

    #[test]
    fn test_authenticate_after_expiry_fails_with_expired() {
        let manager = manager();
        let session = manager.start_at(8080, 1_000).unwrap();
        let err = manager
            .authenticate_at(&session.pin, "phone", 1_000 + 900_000)
            .unwrap_err();
        assert!(matches!(err, Error::Expired));
    }

    #[test]
    fn test_session_is_single_use_for_pairing() {
        let manager = manager();
        let session = manager.start_at(8080, 1_000).unwrap();
        manager
            .authenticate_at(&session.pin, "phone", 2_000)
            .unwrap();

        let err = manager
            .authenticate_at(&session.pin, "tablet", 3_000)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_remaining_time_counts_down_to_zero() {
        let manager = manager();
        manager.start_at(8080, 0).unwrap();

        let early = manager.remaining_ms_at(10_000);
        let later = manager.remaining_ms_at(600_000);
        assert!(early >= later);
        assert_eq!(manager.remaining_ms_at(900_000), 0);
        assert_eq!(manager.phase(), SessionPhase::Closed);
        // Stays at zero afterwards
        assert_eq!(manager.remaining_ms_at(901_000), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let manager = manager();
        manager.start_at(8080, 1_000).unwrap();
        manager.stop();
        manager.stop();
        assert!(!manager.is_active());
        assert_eq!(manager.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_token_rejected_after_expiry() {
        let manager = manager();
        let session = manager.start_at(8080, 1_000).unwrap();
        let (token, _) = manager
            .authenticate_at(&session.pin, "phone", 2_000)
            .unwrap();

        let err = manager
            .begin_ingest_at(&token, 1_000 + 900_000)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_ingest_is_single_shot() {
        let manager = manager();
        let session = manager.start_at(8080, 1_000).unwrap();
        let (token, _) = manager
            .authenticate_at(&session.pin, "phone", 2_000)
            .unwrap();

        manager.begin_ingest_at(&token, 3_000).unwrap();
        manager.complete_ingest(&token);

        let err = manager.begin_ingest_at(&token, 4_000).unwrap_err();
        assert!(matches!(err, Error::AlreadyIngested));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let manager = manager();
        let session = manager.start_at(8080, 1_000).unwrap();
        manager
            .authenticate_at(&session.pin, "phone", 2_000)
            .unwrap();

        let err = manager.begin_ingest_at("bogus", 3_000).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }
}
