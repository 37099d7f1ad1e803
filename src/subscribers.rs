use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::utils::error::Result;

/// A chat the bot delivers to. Stored files may hold numeric chat ids or
/// channel usernames.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriberId {
    Chat(i64),
    Channel(String),
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberId::Chat(id) => write!(f, "{}", id),
            SubscriberId::Channel(name) => write!(f, "{}", name),
        }
    }
}

impl From<i64> for SubscriberId {
    fn from(id: i64) -> Self {
        SubscriberId::Chat(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Added,
    AlreadySubscribed,
}

/// Set of subscribers mirrored to a JSON file. Every mutation rewrites the
/// whole file before the call returns; a failed write leaves the set as it
/// was before the call.
#[derive(Debug)]
pub struct SubscriberStore {
    path: PathBuf,
    ids: Mutex<BTreeSet<SubscriberId>>,
}

impl SubscriberStore {
    /// Loads the store from `path`. A missing file is an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let ids = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeSet::new(),
            Ok(bytes) => serde_json::from_slice::<Vec<SubscriberId>>(&bytes)?.into_iter().collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Subscriber file {} not found, starting empty", path.display());
                BTreeSet::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} subscribers from {}", ids.len(), path.display());

        Ok(Self {
            path,
            ids: Mutex::new(ids),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn subscribe(&self, id: SubscriberId) -> Result<SubscribeOutcome> {
        let mut ids = self.ids.lock().await;
        if ids.contains(&id) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        ids.insert(id.clone());
        if let Err(e) = self.persist(&ids).await {
            ids.remove(&id);
            return Err(e);
        }

        info!("Subscriber {} added ({} total)", id, ids.len());
        Ok(SubscribeOutcome::Added)
    }

    /// Returns whether `id` was subscribed.
    pub async fn unsubscribe(&self, id: &SubscriberId) -> Result<bool> {
        let mut ids = self.ids.lock().await;
        if !ids.remove(id) {
            return Ok(false);
        }

        if let Err(e) = self.persist(&ids).await {
            ids.insert(id.clone());
            return Err(e);
        }

        info!("Subscriber {} removed ({} total)", id, ids.len());
        Ok(true)
    }

    pub async fn contains(&self, id: &SubscriberId) -> bool {
        self.ids.lock().await.contains(id)
    }

    pub async fn snapshot(&self) -> Vec<SubscriberId> {
        self.ids.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }

    async fn persist(&self, ids: &BTreeSet<SubscriberId>) -> Result<()> {
        let json = serde_json::to_vec(&ids.iter().collect::<Vec<_>>())?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
