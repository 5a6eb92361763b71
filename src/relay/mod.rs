mod stream;

pub use stream::relay_frames;

use futures::Stream;
use log::info;
use std::sync::Arc;

use crate::config::ApiKeySource;
use crate::error::RelayError;
use crate::llm::chat::ChatClient;
use crate::models::chat::Turn;
use crate::models::relay::{ RelayFrame, RelayResponse };

/// Stateless bridge between callers and the upstream completion API.
#[derive(Clone)]
pub struct RelayService {
    client: Arc<dyn ChatClient>,
    api_key: ApiKeySource,
}

impl RelayService {
    pub fn new(client: Arc<dyn ChatClient>, api_key: ApiKeySource) -> Self {
        Self { client, api_key }
    }

    /// Resolves the upstream credential for one request.
    pub fn credential(&self) -> Result<String, RelayError> {
        self.api_key.resolve()
    }

    pub async fn complete(&self, api_key: &str, turns: &[Turn]) -> Result<RelayResponse, RelayError> {
        let completion = self.client.complete(api_key, turns).await?;
        info!("Completion relayed ({} chars)", completion.message.content.len());
        Ok(RelayResponse {
            message: completion.message,
            usage: completion.usage,
        })
    }

    pub fn stream(&self, api_key: String, turns: Vec<Turn>) -> impl Stream<Item = RelayFrame> + Send {
        relay_frames(self.client.clone(), api_key, turns)
    }
}
