//! Identities and handshake authentication
//!
//! A connection either resolves to an [`Identity`] (a logged-in user whose
//! playlist lives in the profile store) or is a guest whose state lives only
//! in its session.

use cadence_transport::Handshake;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Resolves a handshake to an identity; `None` means guest
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, handshake: &Handshake) -> Option<Identity>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Treats every connection as a guest
#[derive(Debug, Default, Clone, Copy)]
pub struct GuestOnly;

impl Authenticator for GuestOnly {
    fn authenticate(&self, _handshake: &Handshake) -> Option<Identity> {
        None
    }

    fn name(&self) -> &str {
        "guest-only"
    }
}

/// Fixed bearer tokens mapped to identities
#[derive(Default)]
pub struct StaticTokens {
    tokens: RwLock<HashMap<String, Identity>>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().insert(token.into(), identity);
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

impl<T, I> FromIterator<(T, I)> for StaticTokens
where
    T: Into<String>,
    I: Into<String>,
{
    fn from_iter<It: IntoIterator<Item = (T, I)>>(iter: It) -> Self {
        let tokens = iter
            .into_iter()
            .map(|(token, id)| (token.into(), Identity::new(id)))
            .collect();
        Self {
            tokens: RwLock::new(tokens),
        }
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, handshake: &Handshake) -> Option<Identity> {
        let credential = handshake.credential.as_deref()?;
        self.tokens.read().get(credential).cloned()
    }

    fn name(&self) -> &str {
        "static-tokens"
    }
}
