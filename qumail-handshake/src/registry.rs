//! The session registry.
//!
//! An explicit, injectable map of live session ids — owned by whoever
//! composes the drivers, never a process-wide global. Claiming an id that
//! is already live is a caller bug and is refused; the claim releases
//! itself when dropped, whatever the session's outcome was.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::HandshakeError;

/// Registry of live handshake sessions.
///
/// Cheap to clone; clones share the same underlying map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<DashMap<String, ()>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a session id for a new driver.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateSession` if the id is already live.
    pub fn claim(&self, session_id: &str) -> Result<SessionClaim, HandshakeError> {
        use dashmap::mapref::entry::Entry;

        match self.inner.entry(session_id.to_owned()) {
            Entry::Occupied(_) => Err(HandshakeError::DuplicateSession(session_id.to_owned())),
            Entry::Vacant(entry) => {
                entry.insert(());
                Ok(SessionClaim {
                    registry: Arc::clone(&self.inner),
                    session_id: session_id.to_owned(),
                })
            }
        }
    }

    /// Whether a session id is currently live.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.inner.contains_key(session_id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// An exclusive claim on a session id. Releases the id on drop.
pub struct SessionClaim {
    registry: Arc<DashMap<String, ()>>,
    session_id: String,
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.registry.remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_release() {
        let registry = SessionRegistry::new();
        assert!(!registry.is_active("s-1"));

        let claim = registry.claim("s-1").unwrap();
        assert!(registry.is_active("s-1"));
        assert_eq!(registry.len(), 1);

        drop(claim);
        assert!(!registry.is_active("s-1"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_claim_refused() {
        let registry = SessionRegistry::new();
        let _claim = registry.claim("s-1").unwrap();

        match registry.claim("s-1") {
            Err(HandshakeError::DuplicateSession(id)) => assert_eq!(id, "s-1"),
            other => panic!("expected duplicate refusal, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_reclaim_after_release() {
        let registry = SessionRegistry::new();
        drop(registry.claim("s-1").unwrap());
        assert!(registry.claim("s-1").is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SessionRegistry::new();
        let view = registry.clone();
        let _claim = registry.claim("s-1").unwrap();
        assert!(view.is_active("s-1"));
        assert!(view.claim("s-1").is_err());
    }
}
