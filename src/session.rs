use log::{ info, warn };

use crate::client::reconstruct::ERROR_RESPONSE_MESSAGE;
use crate::client::RelayClient;
use crate::error::StoreError;
use crate::history::ConversationStore;
use crate::models::chat::{ ChatMessage, Role, Turn };

/// One user-facing chat: the store plus the relay it talks to.
pub struct ChatSession {
    store: ConversationStore,
    client: RelayClient,
}

impl ChatSession {
    pub fn new(store: ConversationStore, client: RelayClient) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    /// Sends one user turn and persists exactly one assistant reply.
    ///
    /// Blank input is ignored. `on_delta` sees streamed fragments as they
    /// arrive and is never called in non-streaming mode.
    pub async fn send<F>(
        &mut self,
        content: &str,
        on_delta: F
    ) -> Result<Option<ChatMessage>, StoreError>
        where F: FnMut(&str)
    {
        if content.trim().is_empty() {
            return Ok(None);
        }

        let conversation_id = match self.store.active_id() {
            Some(id) => id.to_string(),
            None => self.store.create_conversation().await?,
        };

        let mut turns: Vec<Turn> = self.store
            .get(&conversation_id)
            .map(|c| c.turns())
            .unwrap_or_default();
        turns.push(Turn::user(content));
        self.store.add_message(&conversation_id, ChatMessage::new(Role::User, content)).await?;

        let reply = if self.store.use_streaming() {
            info!("Sending streaming request with {} turns", turns.len());
            let reconstruction = self.client.stream(&turns, on_delta).await;
            if !reconstruction.is_complete() {
                warn!("Stream ended early: {:?}", reconstruction.outcome);
            }
            reconstruction.into_message()
        } else {
            info!("Sending request with {} turns", turns.len());
            match self.client.complete(&turns).await {
                Ok(response) => ChatMessage::new(Role::Assistant, response.message.content),
                Err(e) => {
                    warn!("Error in chat response: {}", e);
                    ChatMessage::error(ERROR_RESPONSE_MESSAGE)
                }
            }
        };

        self.store.add_message(&conversation_id, reply.clone()).await?;
        Ok(Some(reply))
    }
}
