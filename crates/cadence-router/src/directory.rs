//! Which connection is active for each identity
//!
//! A logged-in user has at most one active connection. When a second one
//! arrives the identity enters a hand-off: the old connection is told to step
//! down and the new one waits until the old is gone (or a watchdog fires).
//!
//! ```text
//! Unbound --connect--> Bound(a) --connect b--> HandoffPending{a, b}
//!    ^                    |                         |      |
//!    +------release a-----+  <--cancel (b leaves)---+      +--complete--> Bound(b)
//! ```
//!
//! All transitions for one identity run under that identity's map shard lock,
//! so concurrent connects and disconnects are serialized per identity.

use cadence_core::ConnectionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Public view of an identity's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Bound(ConnectionId),
    HandoffPending {
        old: ConnectionId,
        new: ConnectionId,
    },
}

/// Result of [`ConnectionDirectory::connect`]
#[derive(Debug)]
pub enum ConnectOutcome {
    /// First connection for the identity; it is active now
    Bound,
    /// The connection was already known
    AlreadyBound,
    /// `old` must step down before the new connection becomes active
    Handoff {
        old: ConnectionId,
        /// A previous successor displaced by this connection
        replaced: Option<ConnectionId>,
        /// Cancelled once the hand-off resolves
        watchdog: CancellationToken,
    },
}

#[derive(Debug)]
enum Slot {
    Bound(ConnectionId),
    Pending {
        old: ConnectionId,
        new: ConnectionId,
        watchdog: CancellationToken,
    },
}

impl Slot {
    fn view(&self) -> Binding {
        match self {
            Slot::Bound(id) => Binding::Bound(id.clone()),
            Slot::Pending { old, new, .. } => Binding::HandoffPending {
                old: old.clone(),
                new: new.clone(),
            },
        }
    }
}

/// Identity id -> active connection
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    slots: DashMap<String, Slot>,
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` as the newest connection for `identity`
    pub fn connect(&self, identity: &str, conn: &str) -> ConnectOutcome {
        match self.slots.entry(identity.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Bound(conn.to_string()));
                ConnectOutcome::Bound
            }
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                match slot {
                    Slot::Bound(current) if current == conn => ConnectOutcome::AlreadyBound,
                    Slot::Bound(current) => {
                        let old = current.clone();
                        let watchdog = CancellationToken::new();
                        *slot = Slot::Pending {
                            old: old.clone(),
                            new: conn.to_string(),
                            watchdog: watchdog.clone(),
                        };
                        debug!("{}: hand-off {} -> {}", identity, old, conn);
                        ConnectOutcome::Handoff {
                            old,
                            replaced: None,
                            watchdog,
                        }
                    }
                    Slot::Pending { old, new, .. } if old == conn || new == conn => {
                        ConnectOutcome::AlreadyBound
                    }
                    Slot::Pending { old, new, watchdog } => {
                        watchdog.cancel();
                        let replaced = std::mem::replace(new, conn.to_string());
                        *watchdog = CancellationToken::new();
                        debug!("{}: successor {} replaced by {}", identity, replaced, conn);
                        ConnectOutcome::Handoff {
                            old: old.clone(),
                            replaced: Some(replaced),
                            watchdog: watchdog.clone(),
                        }
                    }
                }
            }
        }
    }

    /// Finish a pending hand-off away from `old`; returns the now-active successor
    pub fn complete_handoff(&self, identity: &str, old: &str) -> Option<ConnectionId> {
        let mut slot = self.slots.get_mut(identity)?;
        let new = match &*slot {
            Slot::Pending {
                old: pending_old,
                new,
                watchdog,
            } if pending_old == old => {
                watchdog.cancel();
                new.clone()
            }
            _ => return None,
        };
        *slot = Slot::Bound(new.clone());
        debug!("{}: hand-off complete, {} active", identity, new);
        Some(new)
    }

    /// Abandon a pending hand-off to `new`; returns the connection that stays active
    pub fn cancel_handoff(&self, identity: &str, new: &str) -> Option<ConnectionId> {
        let mut slot = self.slots.get_mut(identity)?;
        let old = match &*slot {
            Slot::Pending {
                old,
                new: pending_new,
                watchdog,
            } if pending_new == new => {
                watchdog.cancel();
                old.clone()
            }
            _ => return None,
        };
        *slot = Slot::Bound(old.clone());
        debug!("{}: hand-off to {} cancelled, {} stays", identity, new, old);
        Some(old)
    }

    /// Unbind `conn` if it is the active connection
    pub fn release(&self, identity: &str, conn: &str) -> bool {
        self.slots
            .remove_if(identity, |_, slot| matches!(slot, Slot::Bound(c) if c == conn))
            .is_some()
    }

    pub fn binding(&self, identity: &str) -> Binding {
        self.slots
            .get(identity)
            .map(|slot| slot.view())
            .unwrap_or(Binding::Unbound)
    }

    /// Active (or outgoing) connection for `identity`
    pub fn active(&self, identity: &str) -> Option<ConnectionId> {
        match self.binding(identity) {
            Binding::Unbound => None,
            Binding::Bound(id) | Binding::HandoffPending { old: id, .. } => Some(id),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every binding, cancelling pending watchdogs
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            if let Slot::Pending { watchdog, .. } = slot.value() {
                watchdog.cancel();
            }
        }
        self.slots.clear();
    }
}
