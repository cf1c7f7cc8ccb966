//! Connection handshake metadata
//!
//! The session id and login credential ride on the upgrade request:
//! `?session=<id>&token=<credential>`, an `Authorization: Bearer` header, or a
//! `cadence_session` cookie. Query parameters win over headers.

use std::net::SocketAddr;

use cadence_core::SESSION_COOKIE;

/// What a transport learned about a client while accepting it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Remote address, when the transport has one
    pub addr: Option<SocketAddr>,
    /// Client-provided session id
    pub session: Option<String>,
    /// Opaque login credential, resolved to an identity by the hub
    pub credential: Option<String>,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Build from the pieces of an HTTP upgrade request
    pub fn from_request(
        addr: Option<SocketAddr>,
        query: Option<&str>,
        cookie: Option<&str>,
        authorization: Option<&str>,
    ) -> Self {
        let mut handshake = Self {
            addr,
            ..Self::default()
        };

        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                if value.is_empty() {
                    continue;
                }
                match key.as_ref() {
                    "session" => handshake.session = Some(value.into_owned()),
                    "token" => handshake.credential = Some(value.into_owned()),
                    _ => {}
                }
            }
        }

        if handshake.session.is_none() {
            handshake.session = cookie.and_then(session_from_cookie);
        }

        if handshake.credential.is_none() {
            handshake.credential = authorization
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
        }

        handshake
    }
}

fn session_from_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parameters() {
        let hs = Handshake::from_request(None, Some("session=abc&token=t%201&x=1"), None, None);
        assert_eq!(hs.session.as_deref(), Some("abc"));
        assert_eq!(hs.credential.as_deref(), Some("t 1"));
    }

    #[test]
    fn test_cookie_fallback() {
        let hs = Handshake::from_request(
            None,
            Some("other=1"),
            Some("theme=dark; cadence_session=s-42; lang=en"),
            Some("Bearer secret"),
        );
        assert_eq!(hs.session.as_deref(), Some("s-42"));
        assert_eq!(hs.credential.as_deref(), Some("secret"));
    }

    #[test]
    fn test_query_wins_over_cookie() {
        let hs = Handshake::from_request(None, Some("session=q"), Some("cadence_session=c"), None);
        assert_eq!(hs.session.as_deref(), Some("q"));
    }

    #[test]
    fn test_empty_values_ignored() {
        let hs = Handshake::from_request(None, Some("session=&token="), Some("cadence_session="), None);
        assert_eq!(hs, Handshake::default());
    }
}
