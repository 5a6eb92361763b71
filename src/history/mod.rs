mod file;

pub use file::JsonFileBackend;

use async_trait::async_trait;
use log::{ error, info };
use serde::{ Serialize, Deserialize };
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::chat::{ ChatMessage, Conversation };

fn default_streaming() -> bool {
    true
}

/// Everything the store persists, saved and loaded as one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub active_conversation_id: Option<String>,
    #[serde(default = "default_streaming")]
    pub use_streaming: bool,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            conversations: Vec::new(),
            active_conversation_id: None,
            use_streaming: default_streaming(),
        }
    }
}

impl StoreSnapshot {
    /// Guarantees at least one conversation and a valid active id.
    fn normalize(&mut self) {
        if self.conversations.is_empty() {
            self.conversations.push(Conversation::new());
        }
        let active_known = self.active_conversation_id
            .as_ref()
            .map(|id| self.conversations.iter().any(|c| &c.id == id))
            .unwrap_or(false);
        if !active_known {
            self.active_conversation_id = self.conversations.first().map(|c| c.id.clone());
        }
    }
}

#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    async fn load(&self) -> Result<Option<StoreSnapshot>, StoreError>;
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryBackend {
    snapshot: Mutex<Option<StoreSnapshot>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self { snapshot: Mutex::new(Some(snapshot)) }
    }

    pub async fn snapshot(&self) -> Option<StoreSnapshot> {
        self.snapshot.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<StoreSnapshot>, StoreError> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        Ok(())
    }
}

/// Named conversations plus the active selection, written through to a
/// backend after every change.
pub struct ConversationStore {
    backend: Arc<dyn SnapshotBackend>,
    snapshot: StoreSnapshot,
}

impl ConversationStore {
    pub async fn open(backend: Arc<dyn SnapshotBackend>) -> Result<Self, StoreError> {
        let mut snapshot = match backend.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => StoreSnapshot::default(),
            Err(e) => {
                error!("Failed to load conversations, starting fresh: {}", e);
                StoreSnapshot::default()
            }
        };
        snapshot.normalize();
        info!("Loaded {} conversation(s)", snapshot.conversations.len());

        let store = Self { backend, snapshot };
        store.persist().await?;
        Ok(store)
    }

    async fn persist(&self) -> Result<(), StoreError> {
        self.backend.save(&self.snapshot).await
    }

    fn position(&self, id: &str) -> Result<usize, StoreError> {
        self.snapshot.conversations
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation, StoreError> {
        let index = self.position(id)?;
        Ok(&mut self.snapshot.conversations[index])
    }

    pub fn list(&self) -> &[Conversation] {
        &self.snapshot.conversations
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.snapshot.conversations.iter().find(|c| c.id == id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.snapshot.active_conversation_id.as_deref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active_id().and_then(|id| self.get(id))
    }

    pub fn use_streaming(&self) -> bool {
        self.snapshot.use_streaming
    }

    pub async fn set_streaming(&mut self, enabled: bool) -> Result<(), StoreError> {
        self.snapshot.use_streaming = enabled;
        self.persist().await
    }

    pub async fn set_active(&mut self, id: &str) -> Result<(), StoreError> {
        self.position(id)?;
        self.snapshot.active_conversation_id = Some(id.to_string());
        self.persist().await
    }

    pub async fn create_conversation(&mut self) -> Result<String, StoreError> {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.snapshot.conversations.push(conversation);
        self.snapshot.active_conversation_id = Some(id.clone());
        self.persist().await?;
        Ok(id)
    }

    /// Removes a conversation. Deleting the active one selects the first
    /// remaining conversation, or a fresh one when none are left.
    pub async fn delete_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        let index = self.position(id)?;
        self.snapshot.conversations.remove(index);
        if self.active_id() == Some(id) {
            self.snapshot.active_conversation_id = None;
        }
        self.snapshot.normalize();
        self.persist().await
    }

    pub async fn rename_conversation(&mut self, id: &str, title: &str) -> Result<(), StoreError> {
        let conversation = self.conversation_mut(id)?;
        conversation.title = title.to_string();
        conversation.touch();
        self.persist().await
    }

    pub async fn add_message(&mut self, id: &str, message: ChatMessage) -> Result<(), StoreError> {
        let conversation = self.conversation_mut(id)?;
        conversation.messages.push(message);
        conversation.touch();
        self.persist().await
    }

    pub async fn clear_conversation(&mut self, id: &str) -> Result<(), StoreError> {
        let conversation = self.conversation_mut(id)?;
        conversation.messages = vec![ChatMessage::welcome()];
        conversation.touch();
        self.persist().await
    }
}
