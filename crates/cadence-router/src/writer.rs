//! Background persistence of identity state
//!
//! Mutations are applied in memory first and mirrored to the [`ProfileStore`]
//! by spawned writes, so a slow store never stalls an event handler. Writes
//! for one identity run one at a time and carry a sequence number: a write
//! that loses the race to a newer one is skipped rather than clobbering it.
//! An identity's bookkeeping is dropped once its last queued write finishes.

use cadence_core::{ConnectionId, PlaylistState};
use dashmap::{DashMap, DashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::identity::Identity;
use crate::join::join_all_with_deadline;
use crate::profile::ProfileStore;

/// Retry schedule for failed writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before the first retry; doubles each time
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

// Highest sequence number stored per field
#[derive(Debug, Default)]
struct Applied {
    playlist: u64,
    connection: u64,
}

#[derive(Debug)]
enum Write {
    Playlist(PlaylistState),
    ConnectionId(Option<ConnectionId>),
}

impl Write {
    fn what(&self) -> &'static str {
        match self {
            Write::Playlist(_) => "playlist",
            Write::ConnectionId(_) => "connection id",
        }
    }

    fn is_stale(&self, seq: u64, applied: &Applied) -> bool {
        match self {
            Write::Playlist(_) => seq < applied.playlist,
            Write::ConnectionId(_) => seq < applied.connection,
        }
    }

    fn mark(&self, seq: u64, applied: &mut Applied) {
        match self {
            Write::Playlist(_) => applied.playlist = seq,
            Write::ConnectionId(_) => applied.connection = seq,
        }
    }

    async fn apply(&self, store: &dyn ProfileStore, identity: &Identity) -> Result<()> {
        match self {
            Write::Playlist(playlist) => store.update_playlist(identity, playlist).await,
            Write::ConnectionId(connection) => {
                store
                    .update_connection_id(identity, connection.as_ref())
                    .await
            }
        }
    }
}

/// Fire-and-forget, ordered, retried writes to a [`ProfileStore`]
pub struct PlaylistWriter {
    store: Arc<dyn ProfileStore>,
    policy: RetryPolicy,
    seq: AtomicU64,
    failures: Arc<AtomicU64>,
    // identities whose last playlist write gave up
    diverged: Arc<DashSet<String>>,
    applied: Arc<DashMap<String, Arc<Mutex<Applied>>>>,
    in_flight: Arc<DashMap<String, Vec<(u64, JoinHandle<()>)>>>,
    cancel: CancellationToken,
}

impl PlaylistWriter {
    pub fn new(store: Arc<dyn ProfileStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            seq: AtomicU64::new(0),
            failures: Arc::new(AtomicU64::new(0)),
            diverged: Arc::new(DashSet::new()),
            applied: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Writes that exhausted their retries
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// The store is known to be behind memory for `identity`: its last
    /// playlist write exhausted its retries and nothing newer has landed since
    pub fn is_diverged(&self, identity: &Identity) -> bool {
        self.diverged.contains(&identity.id)
    }

    /// Persist `playlist` for `identity` in the background; returns its sequence number
    pub fn write_playlist(&self, identity: &Identity, playlist: PlaylistState) -> u64 {
        self.spawn(identity, Write::Playlist(playlist))
    }

    /// Persist the active connection id (`None` clears it) in the background
    pub fn write_connection_id(&self, identity: &Identity, connection: Option<ConnectionId>) -> u64 {
        self.spawn(identity, Write::ConnectionId(connection))
    }

    /// Wait for every write queued so far for `identity`
    pub async fn flush(&self, identity: &Identity, deadline: Duration) -> Result<()> {
        let handles: Vec<JoinHandle<()>> = self
            .in_flight
            .remove(&identity.id)
            .map(|(_, handles)| handles.into_iter().map(|(_, h)| h).collect())
            .unwrap_or_default();
        if handles.is_empty() {
            return Ok(());
        }

        debug!("Flushing {} writes for {}", handles.len(), identity);
        join_all_with_deadline(handles, deadline, &self.cancel).await?;
        Ok(())
    }

    /// Wait for every write queued so far, for all identities
    pub async fn flush_all(&self, deadline: Duration) -> Result<()> {
        let keys: Vec<String> = self.in_flight.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<JoinHandle<()>> = keys
            .iter()
            .filter_map(|k| self.in_flight.remove(k))
            .flat_map(|(_, handles)| handles)
            .map(|(_, h)| h)
            .collect();
        if handles.is_empty() {
            return Ok(());
        }

        debug!("Flushing {} pending writes", handles.len());
        join_all_with_deadline(handles, deadline, &self.cancel).await?;
        Ok(())
    }

    /// Writes for `identity` that have not finished yet
    pub fn pending(&self, identity: &Identity) -> usize {
        self.in_flight
            .get(&identity.id)
            .map(|h| h.iter().filter(|(_, h)| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Identities with writes queued or bookkeeping still held
    pub fn tracked(&self) -> usize {
        self.applied.len().max(self.in_flight.len())
    }

    /// Abort any flush in progress
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn spawn(&self, identity: &Identity, write: Write) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = self
            .applied
            .entry(identity.id.clone())
            .or_default()
            .clone();
        let store = self.store.clone();
        let policy = self.policy;
        let failures = self.failures.clone();
        let diverged = self.diverged.clone();
        let applied_map = Arc::clone(&self.applied);
        let in_flight = Arc::clone(&self.in_flight);
        let who = identity.clone();

        // held across the spawn so the task cannot clean up before it is listed
        let mut handles = self.in_flight.entry(identity.id.clone()).or_default();
        handles.retain(|(_, h)| !h.is_finished());

        let handle = tokio::spawn(async move {
            {
                // held for the whole write so one identity's writes never interleave
                let mut applied = slot.lock().await;
                if write.is_stale(seq, &applied) {
                    debug!("Skipping stale {} write #{} for {}", write.what(), seq, who);
                } else {
                    let result = with_retry(policy, write.what(), &who.id, || {
                        write.apply(store.as_ref(), &who)
                    })
                    .await;

                    let playlist = matches!(write, Write::Playlist(_));
                    match result {
                        Ok(()) => {
                            write.mark(seq, &mut applied);
                            if playlist {
                                diverged.remove(&who.id);
                            }
                        }
                        Err(e) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                            if playlist {
                                diverged.insert(who.id.clone());
                            }
                            error!(
                                "PersistenceFailure: {} write #{} for {} gave up after {} retries: {}",
                                write.what(),
                                seq,
                                who,
                                policy.retries,
                                e
                            );
                        }
                    }
                }
            }

            // last one out forgets the identity
            drop(slot);
            applied_map.remove_if(&who.id, |_, slot| Arc::strong_count(slot) == 1);
            in_flight.remove_if(&who.id, |_, handles| {
                handles.iter().all(|(s, h)| *s == seq || h.is_finished())
            });
        });

        handles.push((seq, handle));
        seq
    }
}

/// Run `op` until it succeeds or the policy's retries run out
pub async fn with_retry<F, Fut>(policy: RetryPolicy, what: &str, who: &str, mut op: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.retries => {
                let delay = policy.delay(attempt);
                warn!(
                    "{} write for {} failed ({}), retrying in {:?}",
                    what, who, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
