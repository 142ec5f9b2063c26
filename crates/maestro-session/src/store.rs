use crate::session::Session;
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable storage and lookup for sessions.
///
/// Implementations must persist every mutation before returning success;
/// the orchestrator relies on that for crash recovery.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> MaestroResult<()>;
    async fn get(&self, id: Uuid) -> MaestroResult<Option<Session>>;
    async fn update(&self, session: &Session) -> MaestroResult<()>;
    async fn delete(&self, id: Uuid) -> MaestroResult<()>;
    async fn list_for_user(&self, user_id: &str) -> MaestroResult<Vec<Session>>;
    /// All session ids, for maintenance sweeps.
    async fn list_ids(&self) -> MaestroResult<Vec<Uuid>>;
}

/// File-based session store: one JSON file per session id.
///
/// Writes go to disk on every mutation, which is the flush-on-mutation
/// durability guarantee the engine depends on. Ids are v4 UUIDs, so purged
/// ids are never reused.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub async fn new(dir: PathBuf) -> MaestroResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, session: &Session) -> MaestroResult<()> {
        let path = self.session_path(session.id);
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> MaestroResult<Option<Session>> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let session: Session = serde_json::from_str(&data)
            .map_err(|e| MaestroError::Store(format!("failed to parse session {id}: {e}")))?;
        Ok(Some(session))
    }

    async fn update(&self, session: &Session) -> MaestroResult<()> {
        self.create(session).await
    }

    async fn delete(&self, id: Uuid) -> MaestroResult<()> {
        let path = self.session_path(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> MaestroResult<Vec<Session>> {
        let mut sessions = Vec::new();
        for id in self.list_ids().await? {
            if let Some(session) = self.get(id).await? {
                if session.user_id == user_id {
                    sessions.push(session);
                }
            }
        }
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn list_ids(&self) -> MaestroResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".json") {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        Ok(ids)
    }
}

/// In-memory store for tests and embedded use.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> MaestroResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> MaestroResult<Option<Session>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn update(&self, session: &Session) -> MaestroResult<()> {
        self.create(session).await
    }

    async fn delete(&self, id: Uuid) -> MaestroResult<()> {
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> MaestroResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn list_ids(&self) -> MaestroResult<Vec<Uuid>> {
        Ok(self.sessions.read().await.keys().copied().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemorySessionStore::new();
        let session = Session::new("req", "user-1", false);
        let id = session.id;

        store.create(&session).await.unwrap();
        assert!(store.get(id).await.unwrap().is_some());

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_list_filters_user() {
        let store = MemorySessionStore::new();
        store
            .create(&Session::new("a", "alice", false))
            .await
            .unwrap();
        store
            .create(&Session::new("b", "bob", false))
            .await
            .unwrap();

        let mine = store.list_for_user("alice").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].request, "a");
    }
}
