//! Per-session playlist cache
//!
//! Each browser session (one cookie, possibly several tabs over time) gets a
//! cached [`PlaylistState`]. For guests the cache is the only copy. A session
//! stays alive while any connection is attached and for `ttl` after the last
//! one detaches; [`SessionStore::evict_expired`] reclaims the rest.

use cadence_core::{PlaylistState, SessionId};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cached state for one session
#[derive(Debug, Clone)]
pub struct Session {
    pub playlist: Option<PlaylistState>,
    /// Connections currently attached
    pub attached: usize,
    pub last_seen: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            playlist: None,
            attached: 0,
            last_seen: Instant::now(),
        }
    }

    fn expired_at(&self, now: Instant, ttl: Duration) -> bool {
        self.attached == 0 && now.saturating_duration_since(self.last_seen) >= ttl
    }
}

/// Session id -> session
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Note a connection joining `session`, creating the session if needed
    pub fn attach(&self, session: &str) {
        let mut entry = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(Session::new);
        entry.attached += 1;
        entry.last_seen = Instant::now();
    }

    /// Note a connection leaving `session`; the retention clock starts at zero attachments
    pub fn detach(&self, session: &str) {
        if let Some(mut entry) = self.sessions.get_mut(session) {
            entry.attached = entry.attached.saturating_sub(1);
            entry.last_seen = Instant::now();
        }
    }

    /// Snapshot of the cached playlist
    pub fn playlist(&self, session: &str) -> Option<PlaylistState> {
        self.sessions
            .get(session)
            .and_then(|s| s.playlist.clone())
    }

    /// Replace the cached playlist
    pub fn set_playlist(&self, session: &str, playlist: PlaylistState) {
        let mut entry = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(Session::new);
        entry.playlist = Some(playlist);
        entry.last_seen = Instant::now();
    }

    /// Cached playlist, or a fresh empty one; the flag is true if it was created
    pub fn get_or_insert_playlist(&self, session: &str) -> (PlaylistState, bool) {
        let mut entry = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(Session::new);
        entry.last_seen = Instant::now();
        match &entry.playlist {
            Some(existing) => (existing.clone(), false),
            None => {
                let fresh = PlaylistState::new();
                entry.playlist = Some(fresh.clone());
                (fresh, true)
            }
        }
    }

    /// Mutate an existing playlist; `None` if the session has none
    pub fn modify_playlist<R>(
        &self,
        session: &str,
        f: impl FnOnce(&mut PlaylistState) -> R,
    ) -> Option<R> {
        let mut entry = self.sessions.get_mut(session)?;
        entry.last_seen = Instant::now();
        entry.playlist.as_mut().map(f)
    }

    /// Mutate the playlist, creating an empty one first if needed
    pub fn modify_or_create_playlist<R>(
        &self,
        session: &str,
        f: impl FnOnce(&mut PlaylistState) -> R,
    ) -> R {
        let mut entry = self
            .sessions
            .entry(session.to_string())
            .or_insert_with(Session::new);
        entry.last_seen = Instant::now();
        f(entry.playlist.get_or_insert_with(PlaylistState::new))
    }

    /// Drop detached sessions idle for longer than the ttl; returns how many
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions.retain(|_, s| !s.expired_at(now, ttl));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!("Evicted {} expired sessions", evicted);
        }
        evicted
    }

    pub fn get(&self, session: &str) -> Option<Session> {
        self.sessions.get(session).map(|s| s.clone())
    }

    pub fn contains(&self, session: &str) -> bool {
        self.sessions.contains_key(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::Track;

    #[test]
    fn test_get_or_insert() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (state, created) = store.get_or_insert_playlist("s1");
        assert!(created);
        assert_eq!(state, PlaylistState::new());

        let (_, created) = store.get_or_insert_playlist("s1");
        assert!(!created);
    }

    #[test]
    fn test_modify_requires_existing_playlist() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.attach("s1");
        assert_eq!(store.modify_playlist("s1", |p| p.len()), None);
        assert_eq!(store.modify_playlist("missing", |p| p.len()), None);

        let len = store.modify_or_create_playlist("s1", |p| {
            p.add_track(Track::new("a"), false).unwrap();
            p.len()
        });
        assert_eq!(len, 1);
        assert_eq!(store.modify_playlist("s1", |p| p.len()), Some(1));
    }

    #[test]
    fn test_attached_sessions_never_expire() {
        let store = SessionStore::new(Duration::from_millis(10));
        store.attach("live");
        store.attach("gone");
        store.detach("gone");

        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(store.evict_expired_at(later), 1);
        assert!(store.contains("live"));
        assert!(!store.contains("gone"));
    }

    #[test]
    fn test_ttl_counts_from_detach() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.attach("s1");
        store.detach("s1");
        assert_eq!(store.evict_expired(), 0);
        assert_eq!(store.get("s1").map(|s| s.attached), Some(0));
    }
}
