//! Durable per-identity storage
//!
//! The hub mirrors a logged-in user's playlist and their currently active
//! connection id into a [`ProfileStore`]. Guests never touch it.

use async_trait::async_trait;
use cadence_core::{ConnectionId, PlaylistState};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, RouterError};
use crate::identity::Identity;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Persisted playlist, `None` if the identity never stored one
    async fn get_playlist(&self, identity: &Identity) -> Result<Option<PlaylistState>>;

    async fn update_playlist(&self, identity: &Identity, playlist: &PlaylistState) -> Result<()>;

    /// Record the active connection; `None` clears it
    async fn update_connection_id(
        &self,
        identity: &Identity,
        connection: Option<&ConnectionId>,
    ) -> Result<()>;
}

/// Everything stored for one identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<PlaylistState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    records: DashMap<String, ProfileRecord>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, identity: &Identity) -> Option<ProfileRecord> {
        self.records.get(&identity.id).map(|r| r.clone())
    }

    pub fn connection_id(&self, identity: &Identity) -> Option<ConnectionId> {
        self.records
            .get(&identity.id)
            .and_then(|r| r.connection_id.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_playlist(&self, identity: &Identity) -> Result<Option<PlaylistState>> {
        Ok(self
            .records
            .get(&identity.id)
            .and_then(|r| r.playlist.clone()))
    }

    async fn update_playlist(&self, identity: &Identity, playlist: &PlaylistState) -> Result<()> {
        self.records.entry(identity.id.clone()).or_default().playlist = Some(playlist.clone());
        Ok(())
    }

    async fn update_connection_id(
        &self,
        identity: &Identity,
        connection: Option<&ConnectionId>,
    ) -> Result<()> {
        self.records
            .entry(identity.id.clone())
            .or_default()
            .connection_id = connection.cloned();
        Ok(())
    }
}

/// One JSON document per identity under a directory
#[derive(Debug)]
pub struct JsonFileProfileStore {
    dir: PathBuf,
    // read-modify-write of a record must not interleave
    lock: Mutex<()>,
}

impl JsonFileProfileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!("Profile store at {}", dir.display());
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an identity's document; unsafe filename characters become `_`
    pub fn path_for(&self, identity: &Identity) -> PathBuf {
        let name: String = identity
            .id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    pub async fn load(&self, identity: &Identity) -> Result<ProfileRecord> {
        let path = self.path_for(identity);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                RouterError::Persistence(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ProfileRecord::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn modify<F>(&self, identity: &Identity, f: F) -> Result<()>
    where
        F: FnOnce(&mut ProfileRecord) + Send,
    {
        let _guard = self.lock.lock().await;

        let mut record = self.load(identity).await?;
        f(&mut record);

        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|e| RouterError::Persistence(e.to_string()))?;

        let path = self.path_for(identity);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn get_playlist(&self, identity: &Identity) -> Result<Option<PlaylistState>> {
        Ok(self.load(identity).await?.playlist)
    }

    async fn update_playlist(&self, identity: &Identity, playlist: &PlaylistState) -> Result<()> {
        let playlist = playlist.clone();
        self.modify(identity, move |r| r.playlist = Some(playlist))
            .await
    }

    async fn update_connection_id(
        &self,
        identity: &Identity,
        connection: Option<&ConnectionId>,
    ) -> Result<()> {
        let connection = connection.cloned();
        self.modify(identity, move |r| r.connection_id = connection)
            .await
    }
}
